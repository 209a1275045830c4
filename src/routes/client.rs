use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    appointments::{self, Actor, BookingError, BookingRequest, TransitionError},
    auth::{basic_validator, AuthUser},
    booking::BookingSelection,
    catalog,
    db::log_activity,
    models::{AppointmentStatus, ProfileRow},
    routes::{forbidden, not_found, unprocessable},
    state::{AppState, AppointmentEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(HttpAuthentication::basic(basic_validator))
            .service(
                web::resource("/appointments")
                    .route(web::get().to(history))
                    .route(web::post().to(create_booking)),
            )
            .service(web::resource("/appointments/{id}/cancel").route(web::post().to(cancel)))
            .service(
                web::resource("/profile")
                    .route(web::get().to(profile))
                    .route(web::put().to(update_profile)),
            ),
    );
}

#[derive(Deserialize)]
struct CreateAppointmentPayload {
    /// Absent means no preference; a barber gets assigned at booking time.
    barber_id: Option<String>,
    appointment_date: NaiveDate,
    appointment_time: String,
    service_ids: Vec<String>,
    /// The total shown to the customer. A preview; the stored total comes
    /// from the snapshotted line prices.
    total_price: f64,
    notes: Option<String>,
}

/// The booking submission. Authentication is already enforced by the scope
/// middleware, so an unauthenticated request never reaches this point and
/// performs no writes. Completeness is checked by rebuilding the selection
/// from server-side rows and gating on its readiness.
async fn create_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<CreateAppointmentPayload>,
) -> Result<HttpResponse> {
    let payload = payload.into_inner();

    let mut selection = BookingSelection::new();
    match &payload.barber_id {
        Some(id) => {
            let barber = catalog::fetch_active_barber(&state.db, id)
                .await
                .map_err(actix_web::error::ErrorInternalServerError)?;
            match barber {
                Some(barber) => selection.choose_barber(Some(barber)),
                None => return Ok(unprocessable("unknown or inactive barber")),
            }
        }
        None => selection.choose_barber(None),
    }

    let services = catalog::fetch_active_services_by_ids(&state.db, &payload.service_ids)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    for service in services {
        selection.toggle_service(service);
    }

    selection.select_date(payload.appointment_date);
    let time = payload.appointment_time.trim().to_string();
    if !time.is_empty() {
        selection.select_time(time.clone());
    }

    if let Err(err) = selection.validate() {
        return Ok(unprocessable(err.to_string()));
    }

    let request = BookingRequest {
        user_id: auth.id.clone(),
        barber_id: selection.barber().barber_id().map(str::to_string),
        date: payload.appointment_date,
        time,
        service_ids: payload.service_ids,
        quoted_total: payload.total_price,
        notes: payload
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(str::to_string),
    };

    let row = match appointments::create_appointment(&state.db, request).await {
        Ok(row) => row,
        Err(BookingError::Db(err)) => {
            return Err(actix_web::error::ErrorInternalServerError(err));
        }
        Err(err) => return Ok(unprocessable(err.to_string())),
    };

    log_activity(
        &state.db,
        "appointment_created",
        &format!(
            "{} booked {} at {}.",
            auth.full_name, row.appointment_date, row.appointment_time
        ),
        Some(&auth.id),
        Some(&row.id),
    )
    .await;
    state.publish(AppointmentEvent::from_row("appointment_created", &row));

    let detail = appointments::fetch_detail(&state.db, &row.id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("booking vanished"))?;
    Ok(HttpResponse::Created().json(detail))
}

async fn history(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let appointments = appointments::list_for_user(&state.db, &auth.id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(appointments))
}

/// Customer-side cancellation, legal only while the appointment is pending.
async fn cancel(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let appointment_id = path.into_inner();
    let actor = Actor::Customer {
        user_id: auth.id.clone(),
    };

    let row = match appointments::update_status(
        &state.db,
        &appointment_id,
        AppointmentStatus::Cancelled,
        &actor,
    )
    .await
    {
        Ok(row) => row,
        Err(TransitionError::NotFound) => return Ok(not_found("Appointment not found")),
        Err(TransitionError::Forbidden) => return Ok(forbidden("Not your appointment")),
        Err(err @ TransitionError::Illegal { .. }) => {
            return Ok(HttpResponse::Conflict()
                .json(serde_json::json!({ "error": err.to_string() })));
        }
        Err(TransitionError::Db(err)) => {
            return Err(actix_web::error::ErrorInternalServerError(err));
        }
    };

    log_activity(
        &state.db,
        "appointment_cancelled",
        &format!("{} cancelled an appointment.", auth.full_name),
        Some(&auth.id),
        Some(&row.id),
    )
    .await;
    state.publish(AppointmentEvent::from_row("appointment_updated", &row));

    Ok(HttpResponse::Ok().json(row))
}

async fn profile(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let profile = sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE user_id = ?")
        .bind(&auth.id)
        .fetch_optional(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    match profile {
        Some(profile) => Ok(HttpResponse::Ok().json(profile)),
        None => Ok(not_found("Profile not found")),
    }
}

#[derive(Deserialize)]
struct ProfileUpdateForm {
    full_name: String,
    phone: Option<String>,
    avatar_url: Option<String>,
}

async fn update_profile(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<ProfileUpdateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    if form.full_name.trim().is_empty() {
        return Ok(unprocessable("Full name is required."));
    }

    sqlx::query(
        "UPDATE profiles SET full_name = ?, phone = ?, avatar_url = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(form.full_name.trim())
    .bind(form.phone.as_deref().map(str::trim))
    .bind(form.avatar_url.as_deref().map(str::trim))
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&auth.id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    profile(state, auth).await
}
