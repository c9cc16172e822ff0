use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use lullwave_core::{TicketId, TicketStatus, UserId};

use super::{
    MessageDraft, NewTicket, SupportBackend, SupportError, Ticket, TicketDraft, TicketMessage,
};
use crate::backend::Subscription;

struct Selected {
    ticket_id: TicketId,
    messages: Vec<TicketMessage>,
    channel: Subscription<TicketMessage>,
}

impl Selected {
    /// Append unless a message with the same id is already present.
    fn push(&mut self, message: TicketMessage) -> bool {
        if message.ticket_id != self.ticket_id || self.messages.iter().any(|m| m.id == message.id)
        {
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// State behind the support screen for one signed-in user.
pub struct SupportSession<B: SupportBackend> {
    backend: B,
    user_id: UserId,
    tickets: Vec<Ticket>,
    selected: Option<Selected>,
    csat_prompted: HashSet<TicketId>,
    csat_dismissed: HashSet<TicketId>,
}

impl<B: SupportBackend> SupportSession<B> {
    pub fn new(backend: B, user_id: UserId) -> Self {
        Self {
            backend,
            user_id,
            tickets: Vec::new(),
            selected: None,
            csat_prompted: HashSet::new(),
            csat_dismissed: HashSet::new(),
        }
    }

    /// The user's tickets, newest first.
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    #[must_use]
    pub fn selected_ticket(&self) -> Option<&Ticket> {
        let selected = self.selected.as_ref()?;
        self.tickets.iter().find(|t| t.id == selected.ticket_id)
    }

    /// Transcript of the selected ticket, in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[TicketMessage] {
        self.selected
            .as_ref()
            .map(|s| s.messages.as_slice())
            .unwrap_or_default()
    }

    /// Whether the reply composer is enabled for the selected ticket.
    #[must_use]
    pub fn can_reply(&self) -> bool {
        self.selected_ticket().is_some_and(Ticket::accepts_replies)
    }

    /// Whether a live channel is open.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.selected.as_ref().is_some_and(|s| s.channel.is_active())
    }

    /// Refresh the ticket list.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn load_tickets(&mut self) -> Result<&[Ticket], SupportError> {
        self.tickets = self.backend.list_tickets(self.user_id).await?;
        debug!(count = self.tickets.len(), "Loaded support tickets");
        Ok(&self.tickets)
    }

    /// Open a ticket with its first message.
    ///
    /// Attachments and the support-team notification are best-effort: the
    /// ticket counts as created once the first message is stored.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty subject or body, or a backend
    /// error if the ticket or first message can't be stored.
    #[instrument(skip(self, new_ticket), fields(user_id = %self.user_id))]
    pub async fn create_ticket(&mut self, new_ticket: NewTicket) -> Result<Ticket, SupportError> {
        let subject = new_ticket.subject.trim();
        let body = new_ticket.body.trim();
        if subject.is_empty() {
            return Err(SupportError::EmptySubject);
        }
        if body.is_empty() {
            return Err(SupportError::EmptyMessage);
        }

        let ticket = self
            .backend
            .insert_ticket(&TicketDraft {
                user_id: self.user_id,
                subject: subject.to_string(),
                category: new_ticket.category,
                priority: new_ticket.priority,
                status: TicketStatus::Open,
            })
            .await?;

        let message = self
            .backend
            .insert_message(&MessageDraft {
                ticket_id: ticket.id,
                sender_id: self.user_id,
                body: body.to_string(),
                is_staff: false,
            })
            .await?;

        let mut urls = Vec::with_capacity(new_ticket.attachments.len());
        for attachment in &new_ticket.attachments {
            match self.backend.upload_attachment(ticket.id, attachment).await {
                Ok(url) => urls.push(url),
                Err(e) => warn!(
                    ticket_id = %ticket.id,
                    file_name = %attachment.file_name,
                    error = %e,
                    "Failed to upload ticket attachment"
                ),
            }
        }
        if !urls.is_empty()
            && let Err(e) = self.backend.set_attachment_urls(message.id, &urls).await
        {
            warn!(ticket_id = %ticket.id, error = %e, "Failed to record attachment URLs");
        }

        if let Err(e) = self.backend.notify_ticket_created(&ticket).await {
            warn!(ticket_id = %ticket.id, error = %e, "Failed to notify support team");
        }

        info!(ticket_id = %ticket.id, "Support ticket created");
        self.tickets.insert(0, ticket.clone());
        Ok(ticket)
    }

    /// Make `ticket_id` the selected ticket.
    ///
    /// The previous live channel is closed before the transcript is loaded and
    /// a new channel opened, so at most one channel exists at any time.
    ///
    /// # Errors
    ///
    /// Returns an error if the ticket is unknown or its transcript can't be
    /// loaded; the session is left with nothing selected.
    #[instrument(skip(self))]
    pub async fn select_ticket(&mut self, ticket_id: TicketId) -> Result<(), SupportError> {
        self.close();

        let ticket_created = self
            .tickets
            .iter()
            .find(|t| t.id == ticket_id)
            .map(|t| t.created_at)
            .ok_or(SupportError::NotFound(ticket_id))?;

        let messages = self.backend.list_messages(ticket_id).await?;
        let since = messages
            .iter()
            .map(|m| m.created_at)
            .max()
            .unwrap_or(ticket_created);
        let channel = self.backend.subscribe_messages(ticket_id, since);

        debug!(messages = messages.len(), "Ticket selected");
        self.selected = Some(Selected {
            ticket_id,
            messages,
            channel,
        });
        Ok(())
    }

    /// Append any live messages that have already arrived.
    ///
    /// Returns how many were new.
    pub fn pump(&mut self) -> usize {
        let Some(selected) = self.selected.as_mut() else {
            return 0;
        };
        let mut added = 0;
        while let Some(message) = selected.channel.try_recv() {
            if selected.push(message) {
                added += 1;
            }
        }
        added
    }

    /// Wait for the next new live message and append it.
    ///
    /// Returns `None` when nothing is selected or the channel has ended.
    pub async fn next_update(&mut self) -> Option<TicketMessage> {
        let selected = self.selected.as_mut()?;
        loop {
            let message = selected.channel.recv().await?;
            if selected.push(message.clone()) {
                return Some(message);
            }
        }
    }

    /// Post a reply on the selected ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is selected, the ticket is resolved or
    /// closed, the body is empty, or the backend insert fails.
    #[instrument(skip(self, body))]
    pub async fn send_reply(&mut self, body: &str) -> Result<TicketMessage, SupportError> {
        let ticket = self.selected_ticket().ok_or(SupportError::NoTicketSelected)?;
        if !ticket.accepts_replies() {
            return Err(SupportError::TicketClosed(ticket.status));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(SupportError::EmptyMessage);
        }

        let message = self
            .backend
            .insert_message(&MessageDraft {
                ticket_id: ticket.id,
                sender_id: self.user_id,
                body: body.to_string(),
                is_staff: false,
            })
            .await?;

        // The live channel will deliver this row too; push dedupes it
        if let Some(selected) = self.selected.as_mut() {
            selected.push(message.clone());
        }
        Ok(message)
    }

    /// The selected ticket, if it should show the satisfaction prompt now.
    ///
    /// A finished, unrated ticket prompts once per session; dismissing it
    /// keeps it quiet for the rest of the session.
    pub fn csat_prompt(&mut self) -> Option<TicketId> {
        let ticket = self.selected_ticket()?;
        if !ticket.status.is_finished()
            || ticket.csat_score.is_some()
            || self.csat_dismissed.contains(&ticket.id)
        {
            return None;
        }
        let id = ticket.id;
        self.csat_prompted.insert(id).then_some(id)
    }

    pub fn dismiss_csat(&mut self, ticket_id: TicketId) {
        self.csat_dismissed.insert(ticket_id);
    }

    /// Rate the selected ticket.
    ///
    /// # Errors
    ///
    /// Returns an error for a score outside `1..=5`, when nothing is
    /// selected, or if the backend update fails.
    #[instrument(skip(self, comment))]
    pub async fn submit_csat(
        &mut self,
        score: u8,
        comment: Option<&str>,
    ) -> Result<&Ticket, SupportError> {
        if !(1..=5).contains(&score) {
            return Err(SupportError::InvalidScore(score));
        }
        let ticket_id = self
            .selected
            .as_ref()
            .map(|s| s.ticket_id)
            .ok_or(SupportError::NoTicketSelected)?;
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());

        let updated = self.backend.submit_csat(ticket_id, score, comment).await?;
        info!(ticket_id = %ticket_id, score, "CSAT submitted");

        let ticket = self
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or(SupportError::NotFound(ticket_id))?;
        *ticket = updated;
        Ok(ticket)
    }

    /// Drop the selection and its live channel.
    pub fn close(&mut self) {
        if let Some(selected) = self.selected.take() {
            debug!(ticket_id = %selected.ticket_id, "Closing live channel");
            selected.channel.close();
        }
    }
}
