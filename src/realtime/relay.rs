//! Broadcast relay for live letter edits.
//!
//! One `tokio::sync::broadcast` channel carries every change. Each
//! subscription filters for its letter and drops changes it sent itself, so a
//! publish reaches "everyone else editing this letter". There is no session
//! state, no conflict resolution and no ordering beyond delivery order.
//!
//! `deleted` ends every subscription of the letter and `revoked` ends the
//! subscriptions opened by the removed collaborator, so access lost through
//! the REST API also closes live streams.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

/// Origin used for changes emitted by the REST handlers
pub const SERVER_ORIGIN: &str = "server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Opaque editor delta from a client
    Edit,
    /// The letter was persisted through the REST API
    Saved,
    Deleted,
    /// A collaborator lost access; payload carries their `email`
    Revoked,
}

impl ChangeKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            ChangeKind::Edit => "edit",
            ChangeKind::Saved => "saved",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Revoked => "revoked",
        }
    }

    /// Kinds after which the receiving subscription is closed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChangeKind::Deleted | ChangeKind::Revoked)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LetterChange {
    pub letter_id: String,
    /// Client id of the sender, or `server`
    pub origin: String,
    pub user_id: String,
    pub kind: ChangeKind,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub sent_at: i64,
}

impl LetterChange {
    pub fn edit(letter_id: &str, origin: &str, user_id: &str, payload: serde_json::Value) -> Self {
        Self {
            letter_id: letter_id.to_string(),
            origin: origin.to_string(),
            user_id: user_id.to_string(),
            kind: ChangeKind::Edit,
            payload,
            sent_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn from_server(letter_id: &str, user_id: &str, kind: ChangeKind, payload: serde_json::Value) -> Self {
        Self {
            letter_id: letter_id.to_string(),
            origin: SERVER_ORIGIN.to_string(),
            user_id: user_id.to_string(),
            kind,
            payload,
            sent_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn revoked(letter_id: &str, user_id: &str, email: &str) -> Self {
        Self::from_server(
            letter_id,
            user_id,
            ChangeKind::Revoked,
            serde_json::json!({ "email": email.trim().to_lowercase() }),
        )
    }

    fn revoked_email(&self) -> Option<&str> {
        self.payload.get("email").and_then(|email| email.as_str())
    }
}

#[derive(Clone)]
pub struct RealtimeRelay {
    tx: broadcast::Sender<LetterChange>,
}

impl RealtimeRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Forwards a change; returns how many open subscriptions it reached
    /// (before per-letter filtering). Zero subscribers is not an error.
    pub fn publish(&self, change: LetterChange) -> usize {
        match self.tx.send(change) {
            Ok(count) => {
                log::debug!("📡 Change relayed to {} subscriptions", count);
                count
            }
            Err(_) => {
                log::debug!("📡 No subscribers for change");
                0
            }
        }
    }

    /// `email` is the subscriber's account email, matched against `revoked` changes
    pub fn subscribe(&self, letter_id: &str, client_id: &str, email: &str) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            letter_id: letter_id.to_string(),
            client_id: client_id.to_string(),
            email: email.trim().to_lowercase(),
            ended: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RealtimeRelay {
    fn default() -> Self {
        Self::new(1024)
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<LetterChange>,
    letter_id: String,
    client_id: String,
    email: String,
    ended: bool,
}

impl Subscription {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn letter_id(&self) -> &str {
        &self.letter_id
    }

    fn wants(&self, change: &LetterChange) -> bool {
        if change.letter_id != self.letter_id {
            return false;
        }
        if change.origin != SERVER_ORIGIN && change.origin == self.client_id {
            return false;
        }
        match change.kind {
            ChangeKind::Revoked => change
                .revoked_email()
                .map(|email| email.eq_ignore_ascii_case(&self.email))
                .unwrap_or(false),
            _ => true,
        }
    }

    /// Next change for this letter from someone else. A terminal change is
    /// still returned; after it, and once the relay is gone, this yields `None`.
    pub async fn next(&mut self) -> Option<LetterChange> {
        if self.ended {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(change) if self.wants(&change) => {
                    if change.kind.is_terminal() {
                        log::info!(
                            "🔒 Closing subscription {} on letter {}: {}",
                            self.client_id,
                            self.letter_id,
                            change.kind.event_name()
                        );
                        self.ended = true;
                    }
                    return Some(change);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "⚠️ Subscription {} lagged, skipped {} changes",
                        self.client_id,
                        skipped
                    );
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
