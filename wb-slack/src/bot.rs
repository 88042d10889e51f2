use crate::command::{CommandHandler, CommandRegistry};
use crate::config::BotConfig;
use crate::error::Result;
use crate::session::{Session, SessionState};
use crate::types::{ChannelId, Identity, InboundEvent, SendAck, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

/// A connected bot. Clones share one session, one command registry and one
/// handler task group.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    identity: Identity,
    session: Session,
    commands: CommandRegistry<Bot>,
    handlers: TaskTracker,
}

impl Bot {
    /// Handshakes and opens the transport. Fails without retrying.
    pub async fn connect(config: BotConfig) -> Result<Self> {
        let (session, identity) = Session::connect(&config).await?;
        let commands = CommandRegistry::new(&identity.user_id);
        Ok(Self {
            inner: Arc::new(BotInner {
                identity,
                session,
                commands,
                handlers: TaskTracker::new(),
            }),
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.identity.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.inner.identity.display_name
    }

    pub fn mention(&self) -> &str {
        self.inner.commands.mention()
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Registers `handler` for messages matching `pattern`. Registration
    /// order is evaluation order.
    pub fn command<H>(&self, pattern: &str, handler: H) -> Result<()>
    where
        H: CommandHandler<Bot>,
    {
        self.inner.commands.register(pattern, handler)
    }

    pub async fn say(&self, channel: impl Into<ChannelId>, text: impl Into<String>) -> Result<()> {
        self.inner.session.say(channel, text).await
    }

    /// Runs the session and routes its events until the session ends.
    #[tracing::instrument(level = "info", skip_all, fields(user_id = %self.user_id()))]
    pub async fn start(&self) -> Result<()> {
        let mut events = self.inner.session.events().await?;
        let session_run = self.inner.session.start();
        tokio::pin!(session_run);

        let mut events_open = true;
        let result = loop {
            tokio::select! {
                result = &mut session_run => break result,
                event = events.recv(), if events_open => match event {
                    Some(event) => self.route(event),
                    None => events_open = false,
                },
            }
        };
        self.drain(&mut events);
        result
    }

    pub async fn stop(&self) -> Result<()> {
        self.inner.session.stop().await
    }

    /// Waits for every handler spawned so far. New dispatches are still
    /// accepted afterwards.
    pub async fn wait_for_handlers(&self) {
        self.inner.handlers.close();
        self.inner.handlers.wait().await;
        self.inner.handlers.reopen();
    }

    pub fn handlers_in_flight(&self) -> usize {
        self.inner.handlers.len()
    }

    fn drain(&self, events: &mut mpsc::Receiver<InboundEvent>) {
        while let Ok(event) = events.try_recv() {
            self.route(event);
        }
    }

    fn route(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => {
                let spawned = self
                    .inner
                    .commands
                    .dispatch(self, &message, &self.inner.handlers);
                if spawned > 0 {
                    tracing::debug!(
                        channel = %message.channel,
                        handlers = spawned,
                        "message dispatched"
                    );
                }
            }
            InboundEvent::Ack(ack) => log_ack(&ack),
            InboundEvent::Raw(raw) => tracing::debug!(frame = %raw, "unhandled frame"),
        }
    }
}

fn log_ack(ack: &SendAck) {
    if ack.ok {
        tracing::debug!(reply_to = ack.reply_to, ts = %ack.timestamp, "message acknowledged");
        return;
    }
    let (code, msg) = ack
        .error
        .as_ref()
        .map(|e| (e.code, e.msg.as_str()))
        .unwrap_or((0, "unknown"));
    tracing::warn!(reply_to = ack.reply_to, code, msg, "message rejected by hub");
}
