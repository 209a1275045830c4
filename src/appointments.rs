use std::collections::HashMap;

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use crate::{
    auth::new_id,
    models::{AppointmentRow, AppointmentStatus},
};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("select at least one service")]
    NoServices,
    #[error("unknown or inactive barber")]
    UnknownBarber,
    #[error("unknown or inactive service")]
    UnknownService,
    #[error("no barber is available on {0}")]
    NoBarberAvailable(NaiveDate),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("appointment not found")]
    NotFound,
    #[error("not allowed to modify this appointment")]
    Forbidden,
    #[error("cannot move a {from} appointment to {to}")]
    Illegal {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Who is asking for a status change. Customers act on their own
/// appointments, barbers on the ones assigned to them.
#[derive(Debug, Clone)]
pub enum Actor {
    Customer { user_id: String },
    Barber { barber_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorKind {
    Customer,
    Barber,
}

#[derive(Debug)]
pub struct BookingRequest {
    pub user_id: String,
    /// `None` is the no-preference path; a barber gets assigned.
    pub barber_id: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub service_ids: Vec<String>,
    /// The total the customer saw. A preview only; the stored total comes
    /// from the prices snapshotted into the line items.
    pub quoted_total: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceLine {
    pub service_id: String,
    pub service_name: String,
    pub price_at_booking: f64,
}

/// An appointment joined with its barber, its line items and, on the
/// barber-side reads, the customer profile.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetail {
    pub id: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub status: AppointmentStatus,
    pub total_price: f64,
    pub notes: Option<String>,
    pub created_at: String,
    pub barber_id: String,
    pub barber_name: String,
    pub barber_image_url: Option<String>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub services: Vec<ServiceLine>,
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentJoinRow {
    id: String,
    appointment_date: NaiveDate,
    appointment_time: String,
    status: AppointmentStatus,
    total_price: f64,
    notes: Option<String>,
    created_at: String,
    barber_id: String,
    barber_name: String,
    barber_image_url: Option<String>,
    client_name: Option<String>,
    client_phone: Option<String>,
}

/// Books an appointment and its price-snapshot line items in one
/// transaction. The appointment row is written first, then the current
/// prices are read for exactly the requested services and frozen into the
/// line items; any failure rolls the whole booking back, so an appointment
/// without line items cannot be left behind.
pub async fn create_appointment(
    pool: &SqlitePool,
    request: BookingRequest,
) -> Result<AppointmentRow, BookingError> {
    // Set semantics over the submitted ids, preserving order.
    let mut deduped: Vec<String> = Vec::with_capacity(request.service_ids.len());
    for id in &request.service_ids {
        if !deduped.contains(id) {
            deduped.push(id.clone());
        }
    }
    if deduped.is_empty() {
        return Err(BookingError::NoServices);
    }

    let mut tx = pool.begin().await?;

    let barber_id = match &request.barber_id {
        Some(id) => {
            let active = sqlx::query_as::<_, (String,)>(
                "SELECT id FROM barbers WHERE id = ? AND is_active = 1",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            active.ok_or(BookingError::UnknownBarber)?.0
        }
        None => assign_barber(&mut tx, request.date).await?,
    };

    let appointment_id = new_id();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO appointments
           (id, user_id, barber_id, appointment_date, appointment_time, status, total_price, notes, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&appointment_id)
    .bind(&request.user_id)
    .bind(&barber_id)
    .bind(request.date)
    .bind(&request.time)
    .bind(AppointmentStatus::Pending)
    .bind(request.quoted_total)
    .bind(&request.notes)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    // Authoritative prices for exactly the requested services.
    let placeholders = vec!["?"; deduped.len()].join(", ");
    let sql = format!(
        "SELECT id, price FROM services WHERE is_active = 1 AND id IN ({placeholders})"
    );
    let mut query = sqlx::query_as::<_, (String, f64)>(&sql);
    for id in &deduped {
        query = query.bind(id);
    }
    let priced = query.fetch_all(&mut *tx).await?;
    if priced.len() != deduped.len() {
        return Err(BookingError::UnknownService);
    }

    for (service_id, price) in &priced {
        sqlx::query(
            r#"INSERT INTO appointment_services (id, appointment_id, service_id, price_at_booking, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(new_id())
        .bind(&appointment_id)
        .bind(service_id)
        .bind(price)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    let booked_total: f64 = priced.iter().map(|(_, price)| price).sum();
    if (booked_total - request.quoted_total).abs() > 0.005 {
        log::warn!(
            "Quoted total {:.2} no longer matches booked total {:.2} for appointment {appointment_id}",
            request.quoted_total,
            booked_total
        );
        sqlx::query("UPDATE appointments SET total_price = ? WHERE id = ?")
            .bind(booked_total)
            .bind(&appointment_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let row = fetch_appointment(pool, &appointment_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok(row)
}

/// No-preference assignment: the active barber with the fewest
/// non-cancelled appointments on the requested day, ties broken by name.
async fn assign_barber(
    tx: &mut Transaction<'_, Sqlite>,
    date: NaiveDate,
) -> Result<String, BookingError> {
    let row = sqlx::query_as::<_, (String,)>(
        r#"SELECT b.id
           FROM barbers b
           LEFT JOIN appointments a
             ON a.barber_id = b.id AND a.appointment_date = ? AND a.status != 'cancelled'
           WHERE b.is_active = 1
           GROUP BY b.id
           ORDER BY COUNT(a.id) ASC, b.name ASC
           LIMIT 1"#,
    )
    .bind(date)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(|(id,)| id)
        .ok_or(BookingError::NoBarberAvailable(date))
}

pub async fn fetch_appointment(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<AppointmentRow>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// A customer's history, newest first, with the barber and the frozen line
/// items embedded.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AppointmentJoinRow>(
        r#"SELECT a.id, a.appointment_date, a.appointment_time, a.status, a.total_price,
                  a.notes, a.created_at, a.barber_id,
                  b.name AS barber_name, b.image_url AS barber_image_url,
                  NULL AS client_name, NULL AS client_phone
           FROM appointments a
           JOIN barbers b ON b.id = a.barber_id
           WHERE a.user_id = ?
           ORDER BY a.appointment_date DESC, a.appointment_time DESC"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    attach_lines(pool, rows).await
}

/// A barber's appointments in the 7-day window starting at `week_start`,
/// ordered by date and time, with the customer profile embedded.
pub async fn list_for_barber_week(
    pool: &SqlitePool,
    barber_id: &str,
    week_start: NaiveDate,
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    let week_end = week_start + Duration::days(6);
    let rows = sqlx::query_as::<_, AppointmentJoinRow>(
        r#"SELECT a.id, a.appointment_date, a.appointment_time, a.status, a.total_price,
                  a.notes, a.created_at, a.barber_id,
                  b.name AS barber_name, b.image_url AS barber_image_url,
                  p.full_name AS client_name, p.phone AS client_phone
           FROM appointments a
           JOIN barbers b ON b.id = a.barber_id
           LEFT JOIN profiles p ON p.user_id = a.user_id
           WHERE a.barber_id = ? AND a.appointment_date BETWEEN ? AND ?
           ORDER BY a.appointment_date ASC, a.appointment_time ASC"#,
    )
    .bind(barber_id)
    .bind(week_start)
    .bind(week_end)
    .fetch_all(pool)
    .await?;

    attach_lines(pool, rows).await
}

pub async fn fetch_detail(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<AppointmentDetail>, sqlx::Error> {
    let row = sqlx::query_as::<_, AppointmentJoinRow>(
        r#"SELECT a.id, a.appointment_date, a.appointment_time, a.status, a.total_price,
                  a.notes, a.created_at, a.barber_id,
                  b.name AS barber_name, b.image_url AS barber_image_url,
                  NULL AS client_name, NULL AS client_phone
           FROM appointments a
           JOIN barbers b ON b.id = a.barber_id
           WHERE a.id = ?"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(attach_lines(pool, vec![row]).await?.into_iter().next())
}

async fn attach_lines(
    pool: &SqlitePool,
    rows: Vec<AppointmentJoinRow>,
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        r#"SELECT l.appointment_id, l.service_id, s.name AS service_name, l.price_at_booking
           FROM appointment_services l
           JOIN services s ON s.id = l.service_id
           WHERE l.appointment_id IN ({placeholders})
           ORDER BY l.rowid"#
    );
    let mut query = sqlx::query_as::<_, (String, String, String, f64)>(&sql);
    for id in &ids {
        query = query.bind(id);
    }

    let mut lines: HashMap<String, Vec<ServiceLine>> = HashMap::new();
    for (appointment_id, service_id, service_name, price_at_booking) in
        query.fetch_all(pool).await?
    {
        lines.entry(appointment_id).or_default().push(ServiceLine {
            service_id,
            service_name,
            price_at_booking,
        });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let services = lines.remove(&row.id).unwrap_or_default();
            AppointmentDetail {
                id: row.id,
                appointment_date: row.appointment_date,
                appointment_time: row.appointment_time,
                status: row.status,
                total_price: row.total_price,
                notes: row.notes,
                created_at: row.created_at,
                barber_id: row.barber_id,
                barber_name: row.barber_name,
                barber_image_url: row.barber_image_url,
                client_name: row.client_name,
                client_phone: row.client_phone,
                services,
            }
        })
        .collect())
}

fn transition_allowed(from: AppointmentStatus, to: AppointmentStatus, by: ActorKind) -> bool {
    use AppointmentStatus::*;
    if from.is_terminal() {
        return false;
    }
    match (from, to) {
        (Pending, Confirmed) => by == ActorKind::Barber,
        (Pending, Cancelled) => true,
        (Confirmed, Completed) => by == ActorKind::Barber,
        (Confirmed, Cancelled) => by == ActorKind::Barber,
        _ => false,
    }
}

/// The transitions a barber may trigger from a given status, in the order
/// the timeline presents them.
pub fn barber_actions(from: AppointmentStatus) -> Vec<AppointmentStatus> {
    AppointmentStatus::ALL
        .into_iter()
        .filter(|to| transition_allowed(from, *to, ActorKind::Barber))
        .collect()
}

/// Moves an appointment to a new status. A single-field update: the total
/// and the line items are never touched. Concurrent staff edits race
/// last-write-wins; the loser may surface here as an illegal transition.
pub async fn update_status(
    pool: &SqlitePool,
    appointment_id: &str,
    to: AppointmentStatus,
    actor: &Actor,
) -> Result<AppointmentRow, TransitionError> {
    let current = fetch_appointment(pool, appointment_id)
        .await?
        .ok_or(TransitionError::NotFound)?;

    let kind = match actor {
        Actor::Customer { user_id } => {
            if current.user_id != *user_id {
                return Err(TransitionError::Forbidden);
            }
            ActorKind::Customer
        }
        Actor::Barber { barber_id } => {
            if current.barber_id != *barber_id {
                return Err(TransitionError::Forbidden);
            }
            ActorKind::Barber
        }
    };

    if !transition_allowed(current.status, to, kind) {
        return Err(TransitionError::Illegal {
            from: current.status,
            to,
        });
    }

    sqlx::query("UPDATE appointments SET status = ?, updated_at = ? WHERE id = ?")
        .bind(to)
        .bind(Utc::now().to_rfc3339())
        .bind(appointment_id)
        .execute(pool)
        .await?;

    fetch_appointment(pool, appointment_id)
        .await?
        .ok_or(TransitionError::NotFound)
}
