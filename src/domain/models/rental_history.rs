use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lifecycle transition an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    RentalCreated,
    CarReturned,
    RentalCancelled,
    StatusUpdated,
}

impl HistoryAction {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryAction::RentalCreated => "Rental Created",
            HistoryAction::CarReturned => "Car Returned",
            HistoryAction::RentalCancelled => "Rental Cancelled",
            HistoryAction::StatusUpdated => "Status Updated",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Rental Created" => Some(HistoryAction::RentalCreated),
            "Car Returned" => Some(HistoryAction::CarReturned),
            "Rental Cancelled" => Some(HistoryAction::RentalCancelled),
            "Status Updated" => Some(HistoryAction::StatusUpdated),
            _ => None,
        }
    }
}

/// Append-only audit entry for one rental transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalHistory {
    pub(crate) id: i64,
    pub(crate) rental_id: i64,
    pub(crate) action: HistoryAction,
    pub(crate) action_date: DateTime<Utc>,
    pub(crate) action_by: Option<i64>,
    pub(crate) notes: Option<String>,
}

impl RentalHistory {
    pub fn record(
        rental_id: i64,
        action: HistoryAction,
        action_by: Option<i64>,
        notes: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            rental_id,
            action,
            action_date: now,
            action_by,
            notes: Some(notes.into()),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn rental_id(&self) -> i64 {
        self.rental_id
    }

    pub fn action(&self) -> HistoryAction {
        self.action
    }

    pub fn action_date(&self) -> DateTime<Utc> {
        self.action_date
    }

    pub fn action_by(&self) -> Option<i64> {
        self.action_by
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}
