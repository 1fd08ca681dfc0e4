//! Chat-transport abstraction.
//!
//! The supervisor never speaks a wire protocol. It drives these traits,
//! implemented by the embedding process over the real network client; the
//! mock implementations in the test suite exercise the same surface.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::identity::PeerId;
use crate::settings::AccountId;

// ============================================================================
// Message model
// ============================================================================

/// A message id, unique within its chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What kind of conversation a chat is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Direct,
    Group,
    Channel,
}

impl ChatKind {
    /// True for one-to-one conversations.
    pub fn is_direct(self) -> bool {
        matches!(self, Self::Direct)
    }
}

/// Identity and shape of the chat a message arrived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: PeerId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

/// Resolved peer details.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub id: PeerId,
    pub username: Option<String>,
    pub is_bot: bool,
}

/// The connected account's own identity on the network.
#[derive(Debug, Clone)]
pub struct SelfIdentity {
    pub id: PeerId,
    pub username: Option<String>,
}

/// A structured mention entity attached to a message.
#[derive(Debug, Clone)]
pub enum Mention {
    /// Mention resolved to a peer id by the transport.
    Peer(PeerId),
    /// Plain `@username` entity, name only.
    Username(String),
}

/// Reference to the message this one replies to.
///
/// The author is inlined when the transport already resolved it; otherwise
/// the classifier fetches the referenced message on demand.
#[derive(Debug, Clone)]
pub struct ReplyRef {
    pub message_id: MessageId,
    pub author: Option<PeerId>,
}

/// One inbound message as delivered by a subscription or unread fetch.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: MessageId,
    pub chat: ChatInfo,
    pub sender: Option<PeerId>,
    pub text: String,
    pub mentions: Vec<Mention>,
    pub reply_to: Option<ReplyRef>,
}

/// A previously stored message fetched by reference.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: MessageId,
    pub author: Option<PeerId>,
    pub text: String,
}

/// Options for an outbound send.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Send as an in-thread reply to this message.
    pub reply_to: Option<MessageId>,
    /// Suppress the recipient-side notification.
    pub silent: bool,
}

/// An inbound message tagged with the account whose session received it.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub account: AccountId,
    pub message: InboundMessage,
}

/// Sink the transport pushes inbound events into.
pub type EventSink = mpsc::Sender<InboundEvent>;

// ============================================================================
// Transport traits
// ============================================================================

/// Connection factory, one connection per account.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Establish a live connection for the account using its stored
    /// credentials.
    async fn connect(&self, account: AccountId) -> Result<Arc<dyn ChatConnection>, TransportError>;
}

/// One live connection to the chat network.
///
/// All calls are asynchronous and carry the transport's own per-call
/// timeout; the supervisor imposes none of its own.
#[async_trait]
pub trait ChatConnection: Send + Sync {
    /// Whether the underlying link is currently up.
    fn is_connected(&self) -> bool;

    /// The connected account's own identity.
    async fn self_identity(&self) -> Result<SelfIdentity, TransportError>;

    /// Send a text message to a chat.
    async fn send_message(
        &self,
        chat: PeerId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, TransportError>;

    /// Present the account as offline to the network.
    async fn set_offline(&self) -> Result<(), TransportError>;

    /// Attach the inbound-message subscription, replacing any previous one.
    async fn subscribe(&self, sink: EventSink) -> Result<(), TransportError>;

    /// Detach the inbound-message subscription if attached.
    async fn unsubscribe(&self) -> Result<(), TransportError>;

    /// Whether an inbound-message subscription is currently attached.
    fn has_subscription(&self) -> bool;

    /// Fetch a single stored message by reference.
    async fn get_message(
        &self,
        chat: PeerId,
        id: MessageId,
    ) -> Result<Option<StoredMessage>, TransportError>;

    /// Resolve a peer to its full details.
    async fn get_peer(&self, id: PeerId) -> Result<PeerInfo, TransportError>;

    /// Fetch messages received since the last fetch, for deployments that
    /// poll instead of holding a subscription.
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, TransportError>;

    /// Release the connection.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
