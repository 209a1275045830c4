use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{admin_validator, new_id, AuthUser},
    db::log_activity,
    models::{ActivityRow, BarberRow, Role, ServiceRow},
    routes::not_found,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(
                web::resource("/barbers")
                    .route(web::get().to(list_barbers))
                    .route(web::post().to(create_barber)),
            )
            .service(web::resource("/barbers/{id}").route(web::put().to(update_barber)))
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service)),
            )
            .service(web::resource("/services/{id}").route(web::put().to(update_service)))
            .service(web::resource("/users").route(web::get().to(list_users)))
            .service(web::resource("/users/{user_id}/roles").route(web::post().to(set_role)))
            .service(web::resource("/activity").route(web::get().to(activity))),
    );
}

#[derive(Deserialize)]
struct BarberForm {
    name: String,
    specialty: Option<String>,
    image_url: Option<String>,
    slot_interval_minutes: Option<i64>,
    /// Optional staff login this chair belongs to.
    user_id: Option<String>,
    is_active: Option<bool>,
}

fn validate_barber(form: &BarberForm) -> Vec<String> {
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Name is required.".to_string());
    }
    if let Some(interval) = form.slot_interval_minutes {
        if !(5..=120).contains(&interval) {
            errors.push("Slot interval must be between 5 and 120 minutes.".to_string());
        }
    }
    errors
}

/// Admin listing includes inactive entries; the public catalog filters them.
async fn list_barbers(state: web::Data<AppState>) -> Result<HttpResponse> {
    let barbers = sqlx::query_as::<_, BarberRow>("SELECT * FROM barbers ORDER BY name")
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(barbers))
}

async fn create_barber(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<BarberForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let errors = validate_barber(&form);
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({ "errors": errors })));
    }

    let id = new_id();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO barbers (id, user_id, name, specialty, image_url, slot_interval_minutes, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(form.user_id.as_deref())
    .bind(form.name.trim())
    .bind(form.specialty.as_deref().map(str::trim))
    .bind(form.image_url.as_deref().map(str::trim))
    .bind(form.slot_interval_minutes.unwrap_or(30))
    .bind(form.is_active.unwrap_or(true))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "barber_created",
        &format!("{} added barber {}.", auth.full_name, form.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    let row = sqlx::query_as::<_, BarberRow>("SELECT * FROM barbers WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Created().json(row))
}

async fn update_barber(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<BarberForm>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let errors = validate_barber(&form);
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({ "errors": errors })));
    }

    let updated = sqlx::query(
        r#"UPDATE barbers
           SET user_id = ?, name = ?, specialty = ?, image_url = ?, slot_interval_minutes = ?, is_active = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(form.user_id.as_deref())
    .bind(form.name.trim())
    .bind(form.specialty.as_deref().map(str::trim))
    .bind(form.image_url.as_deref().map(str::trim))
    .bind(form.slot_interval_minutes.unwrap_or(30))
    .bind(form.is_active.unwrap_or(true))
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    if updated.rows_affected() == 0 {
        return Ok(not_found("Barber not found"));
    }

    log_activity(
        &state.db,
        "barber_updated",
        &format!("{} updated barber {}.", auth.full_name, form.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    let row = sqlx::query_as::<_, BarberRow>("SELECT * FROM barbers WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(row))
}

#[derive(Deserialize)]
struct ServiceForm {
    name: String,
    description: Option<String>,
    price: f64,
    duration_minutes: i64,
    is_active: Option<bool>,
}

fn validate_service(form: &ServiceForm) -> Vec<String> {
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Name is required.".to_string());
    }
    if form.price <= 0.0 {
        errors.push("Price must be positive.".to_string());
    }
    if form.duration_minutes <= 0 {
        errors.push("Duration must be positive.".to_string());
    }
    errors
}

async fn list_services(state: web::Data<AppState>) -> Result<HttpResponse> {
    let services = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services ORDER BY name")
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(services))
}

async fn create_service(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<ServiceForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let errors = validate_service(&form);
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({ "errors": errors })));
    }

    let id = new_id();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO services (id, name, description, price, duration_minutes, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(form.name.trim())
    .bind(form.description.as_deref().map(str::trim))
    .bind(form.price)
    .bind(form.duration_minutes)
    .bind(form.is_active.unwrap_or(true))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "service_created",
        &format!("{} added service {}.", auth.full_name, form.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Created().json(row))
}

/// Edits apply to future bookings only; line items keep the price that was
/// frozen when their appointment was created.
async fn update_service(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<ServiceForm>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let errors = validate_service(&form);
    if !errors.is_empty() {
        return Ok(HttpResponse::UnprocessableEntity().json(json!({ "errors": errors })));
    }

    let updated = sqlx::query(
        r#"UPDATE services
           SET name = ?, description = ?, price = ?, duration_minutes = ?, is_active = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(form.name.trim())
    .bind(form.description.as_deref().map(str::trim))
    .bind(form.price)
    .bind(form.duration_minutes)
    .bind(form.is_active.unwrap_or(true))
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    if updated.rows_affected() == 0 {
        return Ok(not_found("Service not found"));
    }

    log_activity(
        &state.db,
        "service_updated",
        &format!("{} updated service {}.", auth.full_name, form.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(row))
}

#[derive(Serialize)]
struct UserView {
    id: String,
    email: String,
    full_name: String,
    phone: Option<String>,
    created_at: String,
    roles: Vec<Role>,
}

async fn list_users(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, (String, String, String, Option<String>, String)>(
        r#"SELECT u.id, u.email, p.full_name, p.phone, u.created_at
           FROM users u
           JOIN profiles p ON p.user_id = u.id
           ORDER BY p.full_name"#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;
    let mut users: Vec<UserView> = rows
        .into_iter()
        .map(|(id, email, full_name, phone, created_at)| UserView {
            id,
            email,
            full_name,
            phone,
            created_at,
            roles: Vec::new(),
        })
        .collect();

    let assignments = sqlx::query_as::<_, (String, Role)>("SELECT user_id, role FROM user_roles")
        .fetch_all(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    for user in &mut users {
        user.roles = assignments
            .iter()
            .filter(|(user_id, _)| *user_id == user.id)
            .map(|(_, role)| *role)
            .collect();
    }

    Ok(HttpResponse::Ok().json(users))
}

#[derive(Deserialize)]
struct RoleForm {
    role: Role,
    grant: bool,
}

async fn set_role(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<RoleForm>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let exists = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    if exists.is_none() {
        return Ok(not_found("User not found"));
    }

    if form.grant {
        sqlx::query(
            "INSERT OR IGNORE INTO user_roles (id, user_id, role, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(&user_id)
        .bind(form.role)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;
    } else {
        sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role = ?")
            .bind(&user_id)
            .bind(form.role)
            .execute(&state.db)
            .await
            .map_err(actix_web::error::ErrorInternalServerError)?;
    }

    log_activity(
        &state.db,
        "role_changed",
        &format!(
            "{} {} role {} for user {}.",
            auth.full_name,
            if form.grant { "granted" } else { "revoked" },
            form.role,
            user_id
        ),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

async fn activity(state: web::Data<AppState>) -> Result<HttpResponse> {
    let entries = sqlx::query_as::<_, ActivityRow>(
        "SELECT kind, message, created_at FROM activities ORDER BY created_at DESC LIMIT 50",
    )
    .fetch_all(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(entries))
}

#[cfg(test)]
mod tests {
    use actix_web::test;
    use serde_json::{json, Value};

    use crate::{db::test_pool, models::Role, test_app, testutil};

    #[actix_web::test]
    async fn admin_manages_the_catalog() {
        let pool = test_pool().await;
        let admin = testutil::insert_user(&pool, "admin@example.com", "senha0", "Admin").await;
        testutil::grant_role(&pool, &admin, Role::Admin).await;
        let app = test_app!(pool.clone());

        let request = test::TestRequest::post()
            .uri("/api/admin/services")
            .insert_header(testutil::basic_auth("admin@example.com", "senha0"))
            .set_json(json!({
                "name": "Corte Clássico",
                "price": 45.00,
                "duration_minutes": 30,
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 201);
        let service: Value = test::read_body_json(response).await;
        let service_id = service["id"].as_str().unwrap().to_string();

        // Deactivate it; the public catalog no longer lists it.
        let request = test::TestRequest::put()
            .uri(&format!("/api/admin/services/{service_id}"))
            .insert_header(testutil::basic_auth("admin@example.com", "senha0"))
            .set_json(json!({
                "name": "Corte Clássico",
                "price": 45.00,
                "duration_minutes": 30,
                "is_active": false,
            }))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), 200);

        let request = test::TestRequest::get().uri("/api/services").to_request();
        let response = test::call_service(&app, request).await;
        let catalog: Value = test::read_body_json(response).await;
        assert!(catalog.as_array().unwrap().is_empty());

        let request = test::TestRequest::post()
            .uri("/api/admin/barbers")
            .insert_header(testutil::basic_auth("admin@example.com", "senha0"))
            .set_json(json!({ "name": "Carlos Mendes", "specialty": "Cortes clássicos" }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 201);
        let barber: Value = test::read_body_json(response).await;
        assert_eq!(barber["slot_interval_minutes"], 30);

        // The audit trail saw all of it.
        let request = test::TestRequest::get()
            .uri("/api/admin/activity")
            .insert_header(testutil::basic_auth("admin@example.com", "senha0"))
            .to_request();
        let response = test::call_service(&app, request).await;
        let entries: Value = test::read_body_json(response).await;
        assert!(entries.as_array().unwrap().len() >= 3);
    }

    #[actix_web::test]
    async fn catalog_validation_collects_errors() {
        let pool = test_pool().await;
        let admin = testutil::insert_user(&pool, "admin@example.com", "senha0", "Admin").await;
        testutil::grant_role(&pool, &admin, Role::Admin).await;
        let app = test_app!(pool.clone());

        let request = test::TestRequest::post()
            .uri("/api/admin/services")
            .insert_header(testutil::basic_auth("admin@example.com", "senha0"))
            .set_json(json!({ "name": "  ", "price": 0.0, "duration_minutes": 0 }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 422);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn role_grants_open_and_close_the_admin_scope() {
        let pool = test_pool().await;
        let admin = testutil::insert_user(&pool, "admin@example.com", "senha0", "Admin").await;
        testutil::grant_role(&pool, &admin, Role::Admin).await;
        let user = testutil::insert_user(&pool, "u1@example.com", "senha1", "Usuário Um").await;
        let app = test_app!(pool.clone());

        let request = test::TestRequest::get()
            .uri("/api/admin/users")
            .insert_header(testutil::basic_auth("u1@example.com", "senha1"))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), 403);

        let request = test::TestRequest::post()
            .uri(&format!("/api/admin/users/{user}/roles"))
            .insert_header(testutil::basic_auth("admin@example.com", "senha0"))
            .set_json(json!({ "role": "admin", "grant": true }))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), 200);

        let request = test::TestRequest::get()
            .uri("/api/admin/users")
            .insert_header(testutil::basic_auth("u1@example.com", "senha1"))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), 200);
        let users: Value = test::read_body_json(response).await;
        let listed = users
            .as_array()
            .unwrap()
            .iter()
            .find(|u| u["id"] == user.as_str())
            .unwrap();
        assert!(listed["roles"]
            .as_array()
            .unwrap()
            .contains(&json!("admin")));
    }
}
