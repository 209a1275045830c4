use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{basic_validator, hash_password, new_id, AuthUser},
    booking::time_slots,
    catalog,
    models::Role,
    routes::{not_found, conflict},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/api/auth/signup").route(web::post().to(signup)))
        .service(
            web::scope("/api/auth")
                .wrap(HttpAuthentication::basic(basic_validator))
                .service(web::resource("/login").route(web::post().to(login)))
                .service(web::resource("/session").route(web::get().to(session)))
                .service(web::resource("/logout").route(web::post().to(logout))),
        )
        .service(web::resource("/api/barbers").route(web::get().to(list_barbers)))
        .service(web::resource("/api/barbers/{id}/slots").route(web::get().to(barber_slots)))
        .service(web::resource("/api/services").route(web::get().to(list_services)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

#[derive(Serialize)]
struct SessionView {
    user_id: String,
    email: String,
    full_name: String,
    roles_checked: bool,
    is_admin: bool,
    is_barber: bool,
}

impl From<&AuthUser> for SessionView {
    fn from(user: &AuthUser) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            roles_checked: user.roles.is_known(),
            is_admin: user.roles.is_admin(),
            is_barber: user.roles.is_barber(),
        }
    }
}

async fn login(auth: web::ReqData<AuthUser>) -> HttpResponse {
    HttpResponse::Ok().json(SessionView::from(&*auth))
}

async fn session(auth: web::ReqData<AuthUser>) -> HttpResponse {
    HttpResponse::Ok().json(SessionView::from(&*auth))
}

async fn logout() -> HttpResponse {
    // Credentials are per-request; the client simply stops sending them.
    HttpResponse::Ok().json(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct SignupForm {
    email: String,
    password: String,
    full_name: String,
    phone: Option<String>,
}

async fn signup(state: web::Data<AppState>, form: web::Json<SignupForm>) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if !form.email.contains('@') {
        errors.push("A valid email is required.".to_string());
    }
    if form.password.trim().len() < 6 {
        errors.push("Password must be at least 6 characters.".to_string());
    }
    if form.full_name.trim().is_empty() {
        errors.push("Full name is required.".to_string());
    }
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({ "errors": errors })));
    }

    let email = form.email.trim().to_lowercase();
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    if existing.is_some() {
        return Ok(conflict("Email is already registered."));
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?;
    let user_id = new_id();
    let now = chrono::Utc::now().to_rfc3339();

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(&user_id)
        .bind(&email)
        .bind(&password_hash)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    sqlx::query(
        r#"INSERT INTO profiles (id, user_id, full_name, phone, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&user_id)
    .bind(form.full_name.trim())
    .bind(form.phone.as_deref().map(str::trim))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;
    sqlx::query("INSERT INTO user_roles (id, user_id, role, created_at) VALUES (?, ?, ?, ?)")
        .bind(new_id())
        .bind(&user_id)
        .bind(Role::User.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    tx.commit()
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let view = SessionView {
        user_id,
        email,
        full_name: form.full_name.trim().to_string(),
        roles_checked: true,
        is_admin: false,
        is_barber: false,
    };
    Ok(HttpResponse::Created().json(view))
}

async fn list_barbers(state: web::Data<AppState>) -> Result<HttpResponse> {
    let barbers = catalog::list_active_barbers(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(barbers))
}

async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse> {
    let services = catalog::list_active_services(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(services))
}

#[derive(Deserialize)]
struct SlotsQuery {
    date: NaiveDate,
}

#[derive(Serialize)]
struct SlotView {
    time: String,
    available: bool,
}

/// Bookable start times for one barber on one day, stepped by the barber's
/// slot interval; slots already taken by a live appointment are flagged.
async fn barber_slots(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SlotsQuery>,
) -> Result<HttpResponse> {
    let barber_id = path.into_inner();
    let barber = catalog::fetch_active_barber(&state.db, &barber_id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    let Some(barber) = barber else {
        return Ok(not_found("Barber not found"));
    };

    let taken = sqlx::query_scalar::<_, String>(
        r#"SELECT appointment_time FROM appointments
           WHERE barber_id = ? AND appointment_date = ? AND status != 'cancelled'"#,
    )
    .bind(&barber.id)
    .bind(query.date)
    .fetch_all(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let slots: Vec<SlotView> = time_slots(barber.slot_interval_minutes.max(5) as u32)
        .into_iter()
        .map(|time| SlotView {
            available: !taken.contains(&time),
            time,
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "barber_id": barber.id,
        "date": query.date,
        "slots": slots,
    })))
}
