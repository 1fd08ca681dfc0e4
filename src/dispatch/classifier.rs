//! Reply-eligibility classification.
//!
//! The rules run in a fixed order; the first one that fires decides. Any
//! transport error hit while resolving a referenced message or a sender is
//! treated as "condition not met", never as a classifier failure.

use tracing::debug;

use crate::identity::same_peer;
use crate::settings::AccountSettings;
use crate::transport::{ChatConnection, ChatKind, InboundMessage, Mention, SelfIdentity};

/// Why (or that) a message qualifies for an automated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NotEligible,
    DirectMessage,
    /// Group message mentioning the session's own identity.
    GroupMention,
    /// Group message replying to one the session previously authored.
    GroupReplyToSelf,
}

/// Classify one inbound message against the account's settings.
pub async fn classify(
    conn: &dyn ChatConnection,
    identity: &SelfIdentity,
    settings: &AccountSettings,
    message: &InboundMessage,
) -> Classification {
    // Own messages never qualify.
    if same_peer(message.sender, identity.id) {
        return Classification::NotEligible;
    }

    // Neither do automated senders.
    if let Some(sender) = message.sender {
        match conn.get_peer(sender).await {
            Ok(peer) if peer.is_bot => return Classification::NotEligible,
            Ok(_) => {}
            Err(e) => {
                debug!(sender = %sender, error = %e, "Sender lookup failed, not treating as bot");
            }
        }
    }

    if message.text.trim().is_empty() {
        return Classification::NotEligible;
    }

    match message.chat.kind {
        ChatKind::Direct => {
            if settings.dm_active().is_some() {
                Classification::DirectMessage
            } else {
                Classification::NotEligible
            }
        }
        ChatKind::Group | ChatKind::Channel => {
            if settings.groups_active().is_none() {
                return Classification::NotEligible;
            }
            if mentions_self(identity, message) {
                return Classification::GroupMention;
            }
            if is_reply_to_self(conn, identity, message).await {
                return Classification::GroupReplyToSelf;
            }
            Classification::NotEligible
        }
    }
}

/// Whether the message references the session's own identity, either via a
/// structured mention entity or a literal `@username` in the text.
pub fn mentions_self(identity: &SelfIdentity, message: &InboundMessage) -> bool {
    for mention in &message.mentions {
        match mention {
            Mention::Peer(id) if *id == identity.id => return true,
            Mention::Username(name) => {
                if let Some(own) = identity.username.as_deref()
                    && name.trim_start_matches('@').eq_ignore_ascii_case(own)
                {
                    return true;
                }
            }
            _ => {}
        }
    }

    if let Some(own) = identity.username.as_deref() {
        let text = message.text.to_ascii_lowercase();
        let needle = format!("@{}", own.to_ascii_lowercase());
        let mut search = text.as_str();
        while let Some(pos) = search.find(&needle) {
            let after = &search[pos + needle.len()..];
            // Require a word boundary so @name never matches @namesake.
            let boundary = after
                .chars()
                .next()
                .map(|c| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(true);
            if boundary {
                return true;
            }
            search = after;
        }
    }
    false
}

/// Whether the message replies to one the session authored. Fetches the
/// referenced message when its author was not inlined.
async fn is_reply_to_self(
    conn: &dyn ChatConnection,
    identity: &SelfIdentity,
    message: &InboundMessage,
) -> bool {
    let Some(reply) = &message.reply_to else {
        return false;
    };

    if let Some(author) = reply.author {
        return author == identity.id;
    }

    match conn.get_message(message.chat.id, reply.message_id).await {
        Ok(Some(stored)) => same_peer(stored.author, identity.id),
        Ok(None) => false,
        Err(e) => {
            debug!(
                message = %reply.message_id,
                error = %e,
                "Referenced message fetch failed, not treating as self-reply"
            );
            false
        }
    }
}
