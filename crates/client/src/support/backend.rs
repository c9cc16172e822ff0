//! Support tables on the hosted backend.
//!
//! - `support_tickets`: one row per ticket
//! - `ticket_messages`: transcript rows, with `attachment_urls` as a text array
//! - `ticket-attachments` bucket: uploaded files, path `{ticket_id}/{uuid}-{name}`
//!
//! The support team is notified through the `send-email` function.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use lullwave_core::{MessageId, TicketId, UserId};

use super::{Attachment, MessageDraft, SupportBackend, Ticket, TicketDraft, TicketMessage};
use crate::backend::{BackendClient, BackendError, Order, Query, Subscription};

const TICKETS: &str = "support_tickets";
const MESSAGES: &str = "ticket_messages";
const ATTACHMENTS_BUCKET: &str = "ticket-attachments";
const SUPPORT_INBOX: &str = "support@lullwave.app";

#[derive(Serialize)]
struct AttachmentPatch<'a> {
    attachment_urls: &'a [String],
}

#[derive(Serialize)]
struct CsatPatch<'a> {
    csat_score: u8,
    csat_comment: Option<&'a str>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    to: &'a str,
    subject: String,
    html: String,
}

#[derive(Deserialize)]
struct EmailResponse {
    id: String,
}

/// Keep object keys to a safe character set.
fn storage_key(ticket_id: TicketId, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{ticket_id}/{}-{safe}", uuid::Uuid::new_v4())
}

impl SupportBackend for BackendClient {
    async fn list_tickets(&self, user_id: UserId) -> Result<Vec<Ticket>, BackendError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order("created_at", Order::Desc);
        self.select(TICKETS, &query).await
    }

    async fn insert_ticket(&self, draft: &TicketDraft) -> Result<Ticket, BackendError> {
        self.insert(TICKETS, draft).await
    }

    async fn insert_message(&self, draft: &MessageDraft) -> Result<TicketMessage, BackendError> {
        self.insert(MESSAGES, draft).await
    }

    async fn upload_attachment(
        &self,
        ticket_id: TicketId,
        attachment: &Attachment,
    ) -> Result<String, BackendError> {
        let path = storage_key(ticket_id, &attachment.file_name);
        self.upload(
            ATTACHMENTS_BUCKET,
            &path,
            attachment.bytes.clone(),
            &attachment.content_type,
        )
        .await
    }

    async fn set_attachment_urls(
        &self,
        message_id: MessageId,
        urls: &[String],
    ) -> Result<(), BackendError> {
        let _: Vec<TicketMessage> = self
            .update(
                MESSAGES,
                &Query::new().eq("id", message_id),
                &AttachmentPatch {
                    attachment_urls: urls,
                },
            )
            .await?;
        Ok(())
    }

    async fn notify_ticket_created(&self, ticket: &Ticket) -> Result<(), BackendError> {
        let request = EmailRequest {
            to: SUPPORT_INBOX,
            subject: format!("New support ticket: {}", ticket.subject),
            html: format!(
                "<p>Ticket <code>{}</code> was opened.</p><p>Category: {:?}<br>Priority: {:?}</p>",
                ticket.id, ticket.category, ticket.priority
            ),
        };
        let response: EmailResponse = self.invoke("send-email", &request).await?;
        debug!(ticket_id = %ticket.id, message_id = %response.id, "Support team notified");
        Ok(())
    }

    async fn list_messages(&self, ticket_id: TicketId) -> Result<Vec<TicketMessage>, BackendError> {
        let query = Query::new()
            .eq("ticket_id", ticket_id)
            .order("created_at", Order::Asc);
        self.select(MESSAGES, &query).await
    }

    fn subscribe_messages(
        &self,
        ticket_id: TicketId,
        since: DateTime<Utc>,
    ) -> Subscription<TicketMessage> {
        self.subscribe_inserts(
            MESSAGES,
            Query::new().eq("ticket_id", ticket_id),
            since,
            |m: &TicketMessage| (m.id, m.created_at),
        )
    }

    async fn submit_csat(
        &self,
        ticket_id: TicketId,
        score: u8,
        comment: Option<&str>,
    ) -> Result<Ticket, BackendError> {
        let mut rows: Vec<Ticket> = self
            .update(
                TICKETS,
                &Query::new().eq("id", ticket_id),
                &CsatPatch {
                    csat_score: score,
                    csat_comment: comment,
                    updated_at: Utc::now(),
                },
            )
            .await?;
        rows.pop()
            .ok_or_else(|| BackendError::NotFound(format!("ticket {ticket_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_is_scoped_and_safe() {
        let ticket_id = TicketId::new();
        let key = storage_key(ticket_id, "my photo (1).png");
        assert!(key.starts_with(&format!("{ticket_id}/")));
        assert!(key.ends_with("-my_photo__1_.png"));
        assert!(!key.contains(' '));
    }
}
