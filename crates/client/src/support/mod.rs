//! Support tickets with a live message channel.
//!
//! [`SupportSession`] is the state behind the support screen: the user's
//! tickets, the one selected ticket and its transcript, and the live channel
//! feeding that transcript. Only the selected ticket has a channel open;
//! selecting another ticket (or closing the session) drops it.

mod backend;
mod session;

pub use session::SupportSession;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lullwave_core::{MessageId, TicketCategory, TicketId, TicketPriority, TicketStatus, UserId};

use crate::backend::{BackendError, Subscription};

#[derive(Debug, Error)]
pub enum SupportError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("subject is required")]
    EmptySubject,

    #[error("message is required")]
    EmptyMessage,

    #[error("ticket not found: {0}")]
    NotFound(TicketId),

    #[error("no ticket is selected")]
    NoTicketSelected,

    #[error("ticket is {0}; replies are closed")]
    TicketClosed(TicketStatus),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidScore(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub user_id: UserId,
    pub subject: String,
    #[serde(default)]
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub csat_score: Option<u8>,
    #[serde(default)]
    pub csat_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether the reply composer should be enabled.
    #[must_use]
    pub const fn accepts_replies(&self) -> bool {
        !self.status.is_finished()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: MessageId,
    pub ticket_id: TicketId,
    pub sender_id: UserId,
    pub body: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub attachment_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A file to attach to a new ticket.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Input for [`SupportSession::create_ticket`].
#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub subject: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    /// First message of the conversation.
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Row written when opening a ticket.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDraft {
    pub user_id: UserId,
    pub subject: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
}

/// Row written for a user reply.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDraft {
    pub ticket_id: TicketId,
    pub sender_id: UserId,
    pub body: String,
    pub is_staff: bool,
}

/// Backend operations behind the support screen.
pub trait SupportBackend: Send + Sync {
    /// The user's tickets, newest first.
    fn list_tickets(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<Ticket>, BackendError>> + Send;

    fn insert_ticket(
        &self,
        draft: &TicketDraft,
    ) -> impl Future<Output = Result<Ticket, BackendError>> + Send;

    fn insert_message(
        &self,
        draft: &MessageDraft,
    ) -> impl Future<Output = Result<TicketMessage, BackendError>> + Send;

    /// Store an attachment and return its public URL.
    fn upload_attachment(
        &self,
        ticket_id: TicketId,
        attachment: &Attachment,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn set_attachment_urls(
        &self,
        message_id: MessageId,
        urls: &[String],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Tell the support team a ticket was opened.
    fn notify_ticket_created(
        &self,
        ticket: &Ticket,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// A ticket's transcript, oldest first.
    fn list_messages(
        &self,
        ticket_id: TicketId,
    ) -> impl Future<Output = Result<Vec<TicketMessage>, BackendError>> + Send;

    /// Live channel of messages inserted into `ticket_id` after `since`.
    fn subscribe_messages(
        &self,
        ticket_id: TicketId,
        since: DateTime<Utc>,
    ) -> Subscription<TicketMessage>;

    fn submit_csat(
        &self,
        ticket_id: TicketId,
        score: u8,
        comment: Option<&str>,
    ) -> impl Future<Output = Result<Ticket, BackendError>> + Send;
}
