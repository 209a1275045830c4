use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::models::{AppointmentRow, AppointmentStatus};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<AppointmentEvent>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { db, events }
    }

    /// Best-effort broadcast; nobody listening is fine.
    pub fn publish(&self, event: AppointmentEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AppointmentEvent {
    pub kind: String,
    pub appointment_id: String,
    pub barber_id: String,
    pub status: AppointmentStatus,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub total_price: f64,
}

impl AppointmentEvent {
    pub fn from_row(kind: &str, row: &AppointmentRow) -> Self {
        Self {
            kind: kind.to_string(),
            appointment_id: row.id.clone(),
            barber_id: row.barber_id.clone(),
            status: row.status,
            appointment_date: row.appointment_date,
            appointment_time: row.appointment_time.clone(),
            total_price: row.total_price,
        }
    }
}
