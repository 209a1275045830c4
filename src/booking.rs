use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{BarberRow, ServiceRow};

/// Shop opening windows as minutes since midnight, end exclusive. Mornings
/// run 09:00-12:00, afternoons 14:00-20:00.
const OPENING_WINDOWS: [(u32, u32); 2] = [(9 * 60, 12 * 60), (14 * 60, 20 * 60)];

/// The barber picker distinguishes "not chosen yet" from the explicit
/// "no preference" choice, which is a valid selection.
#[derive(Debug, Clone, Default)]
pub enum BarberChoice {
    #[default]
    Unset,
    NoPreference,
    Chosen(BarberRow),
}

impl BarberChoice {
    pub fn is_set(&self) -> bool {
        !matches!(self, BarberChoice::Unset)
    }

    pub fn barber_id(&self) -> Option<&str> {
        match self {
            BarberChoice::Chosen(barber) => Some(&barber.id),
            _ => None,
        }
    }
}

/// A customer's in-progress booking: four independent selections with no
/// ordering constraint between them. The only gate is [`validate`] at
/// submission time. Ephemeral, owned by a single booking session.
///
/// [`validate`]: BookingSelection::validate
#[derive(Debug, Clone, Default)]
pub struct BookingSelection {
    barber: BarberChoice,
    services: Vec<ServiceRow>,
    date: Option<NaiveDate>,
    time: Option<String>,
}

impl BookingSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current choice; `None` means no preference.
    pub fn choose_barber(&mut self, barber: Option<BarberRow>) {
        self.barber = match barber {
            Some(barber) => BarberChoice::Chosen(barber),
            None => BarberChoice::NoPreference,
        };
    }

    /// Adds the service, or removes it if already selected (keyed by id).
    /// Insertion order is preserved for display.
    pub fn toggle_service(&mut self, service: ServiceRow) {
        if let Some(position) = self.services.iter().position(|s| s.id == service.id) {
            self.services.remove(position);
        } else {
            self.services.push(service);
        }
    }

    pub fn select_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
    }

    pub fn select_time(&mut self, time: String) {
        self.time = Some(time);
    }

    pub fn barber(&self) -> &BarberChoice {
        &self.barber
    }

    pub fn services(&self) -> &[ServiceRow] {
        &self.services
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    pub fn total_price(&self) -> f64 {
        self.services.iter().map(|s| s.price).sum()
    }

    pub fn total_duration(&self) -> i64 {
        self.services.iter().map(|s| s.duration_minutes).sum()
    }

    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), SelectionError> {
        if !self.barber.is_set() {
            return Err(SelectionError::BarberNotChosen);
        }
        if self.services.is_empty() {
            return Err(SelectionError::NoServices);
        }
        if self.date.is_none() {
            return Err(SelectionError::DateNotChosen);
        }
        if self.time.is_none() {
            return Err(SelectionError::TimeNotChosen);
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("choose a barber or pick no preference")]
    BarberNotChosen,
    #[error("select at least one service")]
    NoServices,
    #[error("pick a date")]
    DateNotChosen,
    #[error("pick a time")]
    TimeNotChosen,
}

/// Bookable start times within the opening windows, stepped by the barber's
/// slot interval.
pub fn time_slots(interval_minutes: u32) -> Vec<String> {
    let step = interval_minutes.max(5);
    let mut slots = Vec::new();
    for (start, end) in OPENING_WINDOWS {
        let mut minute = start;
        while minute < end {
            slots.push(format!("{:02}:{:02}", minute / 60, minute % 60));
            minute += step;
        }
    }
    slots
}
