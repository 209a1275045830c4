use actix_web::{http::header, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{
    appointments::{self, Actor, AppointmentDetail, TransitionError},
    auth::{barber_validator, AuthUser},
    db::log_activity,
    models::{AppointmentStatus, BarberRow},
    routes::{forbidden, not_found},
    state::{AppState, AppointmentEvent},
    timeline,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/barber")
            .wrap(HttpAuthentication::basic(barber_validator))
            .service(web::resource("/timeline").route(web::get().to(timeline_view)))
            .service(
                web::resource("/appointments/{id}/status").route(web::post().to(update_status)),
            )
            .service(web::resource("/events").route(web::get().to(stream_events))),
    );
}

/// The staff account must be linked to a barber profile.
async fn resolve_barber(
    state: &web::Data<AppState>,
    auth: &AuthUser,
) -> Result<Option<BarberRow>> {
    sqlx::query_as::<_, BarberRow>("SELECT * FROM barbers WHERE user_id = ?")
        .bind(&auth.id)
        .fetch_optional(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)
}

#[derive(Deserialize)]
struct TimelineQuery {
    week_start: Option<NaiveDate>,
    day: Option<NaiveDate>,
}

#[derive(Serialize)]
struct AppointmentActionView {
    #[serde(flatten)]
    appointment: AppointmentDetail,
    /// The transitions this row currently offers.
    actions: Vec<AppointmentStatus>,
}

#[derive(Serialize)]
struct TimelineView {
    barber_id: String,
    barber_name: String,
    week_start: NaiveDate,
    days: [NaiveDate; 7],
    selected_day: NaiveDate,
    appointments: Vec<AppointmentActionView>,
    today: timeline::Stats,
    week: timeline::Stats,
}

/// The barber's week at a glance: the 7 days around the anchor, the
/// selected day's appointments with their legal next actions, and the
/// today / whole-week aggregates (cancelled excluded).
async fn timeline_view(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<TimelineQuery>,
) -> Result<HttpResponse> {
    let Some(barber) = resolve_barber(&state, &auth).await? else {
        return Ok(not_found("No barber profile for this account"));
    };

    let today = chrono::Utc::now().date_naive();
    let anchor = query.week_start.unwrap_or(today);
    let days = timeline::week_days(anchor);
    let selected_day = query.day.unwrap_or(today);

    let week = appointments::list_for_barber_week(&state.db, &barber.id, days[0])
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let day_appointments = timeline::on_day(&week, selected_day)
        .into_iter()
        .map(|appointment| AppointmentActionView {
            actions: appointments::barber_actions(appointment.status),
            appointment,
        })
        .collect();

    let view = TimelineView {
        barber_id: barber.id,
        barber_name: barber.name,
        week_start: days[0],
        days,
        selected_day,
        appointments: day_appointments,
        today: timeline::stats_for_day(&week, today),
        week: timeline::stats_for_week(&week),
    };
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Deserialize)]
struct StatusForm {
    status: AppointmentStatus,
}

async fn update_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<StatusForm>,
) -> Result<HttpResponse> {
    let Some(barber) = resolve_barber(&state, &auth).await? else {
        return Ok(not_found("No barber profile for this account"));
    };

    let appointment_id = path.into_inner();
    let actor = Actor::Barber {
        barber_id: barber.id.clone(),
    };

    let row = match appointments::update_status(&state.db, &appointment_id, form.status, &actor)
        .await
    {
        Ok(row) => row,
        Err(TransitionError::NotFound) => return Ok(not_found("Appointment not found")),
        Err(TransitionError::Forbidden) => {
            return Ok(forbidden("Appointment belongs to another barber"));
        }
        Err(err @ TransitionError::Illegal { .. }) => {
            return Ok(
                HttpResponse::Conflict().json(serde_json::json!({ "error": err.to_string() }))
            );
        }
        Err(TransitionError::Db(err)) => {
            return Err(actix_web::error::ErrorInternalServerError(err));
        }
    };

    log_activity(
        &state.db,
        "appointment_status",
        &format!(
            "{} moved appointment {} to {}.",
            barber.name, row.id, row.status
        ),
        Some(&auth.id),
        Some(&row.id),
    )
    .await;
    state.publish(AppointmentEvent::from_row("appointment_updated", &row));

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": row.id,
        "status": row.status,
        "actions": appointments::barber_actions(row.status),
    })))
}

/// Server-sent events for this barber's appointments, so the timeline can
/// refresh without a manual reload.
async fn stream_events(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let Some(barber) = resolve_barber(&state, &auth).await? else {
        return Ok(not_found("No barber profile for this account"));
    };

    let rx = state.events.subscribe();
    let barber_id = barber.id;
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.barber_id == barber_id => {
            Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
        }
        _ => None,
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

fn event_to_bytes(event: &AppointmentEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}

#[cfg(test)]
mod tests {
    use actix_web::test;
    use serde_json::{json, Value};
    use sqlx::SqlitePool;

    use crate::{
        appointments::{create_appointment, BookingRequest},
        db::test_pool,
        models::Role,
        test_app, testutil,
    };

    async fn book(
        pool: &SqlitePool,
        user_id: &str,
        barber_id: &str,
        service_id: &str,
        date: &str,
        time: &str,
        total: f64,
    ) -> String {
        let row = create_appointment(
            pool,
            BookingRequest {
                user_id: user_id.to_string(),
                barber_id: Some(barber_id.to_string()),
                date: date.parse().unwrap(),
                time: time.to_string(),
                service_ids: vec![service_id.to_string()],
                quoted_total: total,
                notes: None,
            },
        )
        .await
        .expect("booking");
        row.id
    }

    #[actix_web::test]
    async fn barber_walks_an_appointment_to_completed() {
        let pool = test_pool().await;
        let customer = testutil::insert_user(&pool, "u1@example.com", "senha1", "Usuário Um").await;
        let staff = testutil::insert_user(&pool, "carlos@example.com", "senha2", "Carlos").await;
        testutil::grant_role(&pool, &staff, Role::Barber).await;
        let carlos = testutil::insert_barber(&pool, "Carlos", Some(&staff)).await;
        let cut = testutil::insert_service(&pool, "Corte Clássico", 45.00, 30).await;
        let app = test_app!(pool.clone());

        let id = book(&pool, &customer, &carlos.id, &cut.id, "2025-03-10", "14:30", 45.00).await;

        for (status, expected_actions) in [
            ("confirmed", vec!["completed", "cancelled"]),
            ("completed", vec![]),
        ] {
            let request = test::TestRequest::post()
                .uri(&format!("/api/barber/appointments/{id}/status"))
                .insert_header(testutil::basic_auth("carlos@example.com", "senha2"))
                .set_json(json!({ "status": status }))
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), 200);
            let body: Value = test::read_body_json(response).await;
            assert_eq!(body["status"], status);
            let actions: Vec<&str> = body["actions"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap())
                .collect();
            assert_eq!(actions, expected_actions);
        }

        // Completed is terminal; cancelling afterwards is rejected.
        let request = test::TestRequest::post()
            .uri(&format!("/api/barber/appointments/{id}/status"))
            .insert_header(testutil::basic_auth("carlos@example.com", "senha2"))
            .set_json(json!({ "status": "cancelled" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 409);
    }

    #[actix_web::test]
    async fn skipping_confirmed_is_rejected() {
        let pool = test_pool().await;
        let customer = testutil::insert_user(&pool, "u1@example.com", "senha1", "Usuário Um").await;
        let staff = testutil::insert_user(&pool, "carlos@example.com", "senha2", "Carlos").await;
        testutil::grant_role(&pool, &staff, Role::Barber).await;
        let carlos = testutil::insert_barber(&pool, "Carlos", Some(&staff)).await;
        let cut = testutil::insert_service(&pool, "Corte Clássico", 45.00, 30).await;
        let app = test_app!(pool.clone());

        let id = book(&pool, &customer, &carlos.id, &cut.id, "2025-03-10", "14:30", 45.00).await;

        let request = test::TestRequest::post()
            .uri(&format!("/api/barber/appointments/{id}/status"))
            .insert_header(testutil::basic_auth("carlos@example.com", "senha2"))
            .set_json(json!({ "status": "completed" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 409);
    }

    #[actix_web::test]
    async fn timeline_shows_the_selected_day_and_week_aggregates() {
        let pool = test_pool().await;
        let customer = testutil::insert_user(&pool, "u1@example.com", "senha1", "Usuário Um").await;
        let staff = testutil::insert_user(&pool, "carlos@example.com", "senha2", "Carlos").await;
        testutil::grant_role(&pool, &staff, Role::Barber).await;
        let carlos = testutil::insert_barber(&pool, "Carlos", Some(&staff)).await;
        let cut = testutil::insert_service(&pool, "Corte Clássico", 45.00, 30).await;
        let beard = testutil::insert_service(&pool, "Barba Completa", 35.00, 25).await;
        let app = test_app!(pool.clone());

        let monday = book(&pool, &customer, &carlos.id, &cut.id, "2025-03-10", "09:00", 45.00).await;
        book(&pool, &customer, &carlos.id, &beard.id, "2025-03-10", "14:30", 35.00).await;
        book(&pool, &customer, &carlos.id, &cut.id, "2025-03-12", "10:00", 45.00).await;
        // Outside the displayed week.
        book(&pool, &customer, &carlos.id, &cut.id, "2025-03-17", "10:00", 45.00).await;

        // Cancel one Monday appointment; it stays listed but leaves the sums.
        let request = test::TestRequest::post()
            .uri(&format!("/api/barber/appointments/{monday}/status"))
            .insert_header(testutil::basic_auth("carlos@example.com", "senha2"))
            .set_json(json!({ "status": "cancelled" }))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), 200);

        let request = test::TestRequest::get()
            .uri("/api/barber/timeline?week_start=2025-03-12&day=2025-03-10")
            .insert_header(testutil::basic_auth("carlos@example.com", "senha2"))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 200);
        let body: Value = test::read_body_json(response).await;

        // The anchor snaps back to Monday.
        assert_eq!(body["week_start"], "2025-03-10");
        assert_eq!(body["days"].as_array().unwrap().len(), 7);
        assert_eq!(body["days"][6], "2025-03-16");

        let day = body["appointments"].as_array().unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0]["appointment_time"], "09:00");
        assert_eq!(day[0]["status"], "cancelled");
        assert!(day[0]["actions"].as_array().unwrap().is_empty());
        assert_eq!(day[1]["client_name"], "Usuário Um");
        assert_eq!(
            day[1]["actions"],
            serde_json::json!(["confirmed", "cancelled"])
        );

        assert_eq!(body["week"]["appointments"], 2);
        assert_eq!(body["week"]["revenue"], 80.00);
    }

    #[actix_web::test]
    async fn customers_are_kept_out_of_the_barber_scope() {
        let pool = test_pool().await;
        testutil::insert_user(&pool, "u1@example.com", "senha1", "Usuário Um").await;
        let app = test_app!(pool.clone());

        let request = test::TestRequest::get()
            .uri("/api/barber/timeline")
            .insert_header(testutil::basic_auth("u1@example.com", "senha1"))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 403);
    }

    #[actix_web::test]
    async fn barber_role_without_profile_is_a_missing_profile() {
        let pool = test_pool().await;
        let staff = testutil::insert_user(&pool, "novo@example.com", "senha2", "Novo").await;
        testutil::grant_role(&pool, &staff, Role::Barber).await;
        let app = test_app!(pool.clone());

        let request = test::TestRequest::get()
            .uri("/api/barber/timeline")
            .insert_header(testutil::basic_auth("novo@example.com", "senha2"))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 404);
    }
}
