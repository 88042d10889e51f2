//! Pattern-matched command handlers.
//!
//! A message is only dispatched when it mentions the bot. Every registered
//! pattern is then tried in registration order against the full text and each
//! match runs its handler on its own task. Handlers are never awaited by the
//! dispatcher; their failures and panics are logged.

use crate::error::{Result, SlackError};
use crate::types::{ConversationMessage, UserId};
use futures_util::FutureExt;
use regex::Regex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::task::TaskTracker;
use tracing::Instrument;

#[async_trait::async_trait]
pub trait CommandHandler<C>: Send + Sync + 'static
where
    C: Send + 'static,
{
    /// `captures[0]` is the whole match; unmatched optional groups are empty.
    async fn handle(
        &self,
        ctx: C,
        message: ConversationMessage,
        captures: Vec<String>,
    ) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl<C, F, Fut> CommandHandler<C> for F
where
    C: Send + 'static,
    F: Fn(C, ConversationMessage, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: C,
        message: ConversationMessage,
        captures: Vec<String>,
    ) -> anyhow::Result<()> {
        (self)(ctx, message, captures).await
    }
}

pub struct Command<C: Send + 'static> {
    pattern: Regex,
    handler: Arc<dyn CommandHandler<C>>,
}

impl<C: Send + 'static> Command<C> {
    pub fn new(pattern: &str, handler: Arc<dyn CommandHandler<C>>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| SlackError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { pattern, handler })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// First match and its groups, or `None`.
    pub fn captures(&self, text: &str) -> Option<Vec<String>> {
        let caps = self.pattern.captures(text)?;
        Some(
            caps.iter()
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

pub struct CommandRegistry<C: Send + 'static> {
    mention: String,
    commands: RwLock<Vec<Arc<Command<C>>>>,
}

impl<C> CommandRegistry<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// `user_id` is the identity messages must mention to be dispatched.
    pub fn new(user_id: &UserId) -> Self {
        Self {
            mention: format!("<@{user_id}>"),
            commands: RwLock::new(Vec::new()),
        }
    }

    pub fn mention(&self) -> &str {
        &self.mention
    }

    pub fn register<H>(&self, pattern: &str, handler: H) -> Result<()>
    where
        H: CommandHandler<C>,
    {
        let command = Command::new(pattern, Arc::new(handler))?;
        self.commands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(command));
        tracing::debug!(pattern, "command registered");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns one task per matching command on `tasks` and returns how many
    /// were spawned.
    pub fn dispatch(&self, ctx: &C, message: &ConversationMessage, tasks: &TaskTracker) -> usize {
        if !message.text.contains(&self.mention) {
            tracing::trace!(channel = %message.channel, "message does not mention us");
            return 0;
        }

        let matched: Vec<(Arc<Command<C>>, Vec<String>)> = self
            .commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|command| {
                command
                    .captures(&message.text)
                    .map(|captures| (command.clone(), captures))
            })
            .collect();

        let spawned = matched.len();
        for (command, captures) in matched {
            let span = tracing::info_span!(
                "command",
                pattern = %command.pattern(),
                channel = %message.channel,
                user = %message.user,
            );
            let handler = command.handler.clone();
            let ctx = ctx.clone();
            let message = message.clone();
            tasks.spawn(
                async move {
                    let outcome = AssertUnwindSafe(handler.handle(ctx, message, captures))
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(Ok(())) => tracing::debug!("command handler finished"),
                        Ok(Err(error)) => tracing::warn!(%error, "command handler failed"),
                        Err(payload) => tracing::error!(
                            panic_payload = %panic_payload_to_string(payload.as_ref()),
                            "command handler panicked"
                        ),
                    }
                }
                .instrument(span),
            );
        }
        spawned
    }
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
