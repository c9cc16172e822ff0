//! Status and classification enums shared by the client and backend.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a support ticket.
///
/// `Open -> InProgress -> Resolved | Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Whether the ticket no longer accepts replies.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Resolved => write!(f, "resolved"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Support ticket priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Support ticket category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    #[default]
    General,
    Billing,
    Technical,
    Account,
    Merch,
    Feedback,
}

/// Kind of client telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventType {
    View,
    Click,
    Error,
    Heartbeat,
    Conversion,
    Performance,
    Consent,
}

impl AnalyticsEventType {
    /// Events that should be delivered without waiting for the flush timer.
    #[must_use]
    pub const fn is_urgent(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for AnalyticsEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::View => "view",
            Self::Click => "click",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
            Self::Conversion => "conversion",
            Self::Performance => "performance",
            Self::Consent => "consent",
        };
        f.write_str(name)
    }
}
