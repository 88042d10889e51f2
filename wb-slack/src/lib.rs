//! Realtime messaging client for wagerbot.
//!
//! A [`Bot`] handshakes over HTTP, keeps one websocket session open, and
//! routes messages that mention it to regex-matched command handlers.

mod api;
mod bot;
mod command;
mod config;
mod error;
mod frame;
mod queue;
mod session;
#[cfg(test)]
mod testing;
mod types;

pub use api::{DEFAULT_API_BASE_URL, RtmEndpoint, SlackApi};
pub use bot::Bot;
pub use command::{Command, CommandHandler, CommandRegistry};
pub use config::{
    BotConfig, DEFAULT_CLOSE_GRACE, DEFAULT_HTTP_TIMEOUT, DEFAULT_INBOUND_CAPACITY,
    DEFAULT_KEEPALIVE_INTERVAL,
};
pub use error::{Result, SlackError};
pub use frame::classify;
pub use queue::{DEFAULT_OUTBOUND_CAPACITY, OutboundQueue, OutboundReceiver};
pub use session::{Session, SessionState};
pub use types::{
    AckError, ChannelId, ConversationMessage, Identity, InboundEvent, OutboundMessage, SendAck,
    UserId,
};
