use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::{BarberRow, Role, ServiceRow},
};

pub async fn insert_user(pool: &SqlitePool, email: &str, password: &str, full_name: &str) -> String {
    let user_id = new_id();
    let now = Utc::now().to_rfc3339();
    let password_hash = hash_password(password).expect("hash");

    sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(&user_id)
        .bind(email)
        .bind(&password_hash)
        .bind(&now)
        .execute(pool)
        .await
        .expect("insert user");
    sqlx::query(
        "INSERT INTO profiles (id, user_id, full_name, phone, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(&user_id)
    .bind(full_name)
    .bind("11 99999-0000")
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert profile");
    sqlx::query("INSERT INTO user_roles (id, user_id, role, created_at) VALUES (?, ?, ?, ?)")
        .bind(new_id())
        .bind(&user_id)
        .bind(Role::User.as_str())
        .bind(&now)
        .execute(pool)
        .await
        .expect("insert role");

    user_id
}

pub async fn grant_role(pool: &SqlitePool, user_id: &str, role: Role) {
    sqlx::query("INSERT OR IGNORE INTO user_roles (id, user_id, role, created_at) VALUES (?, ?, ?, ?)")
        .bind(new_id())
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("grant role");
}

pub async fn insert_barber(pool: &SqlitePool, name: &str, user_id: Option<&str>) -> BarberRow {
    let id = new_id();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO barbers (id, user_id, name, slot_interval_minutes, is_active, created_at, updated_at)
           VALUES (?, ?, ?, 30, 1, ?, ?)"#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(name)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert barber");

    fetch_barber(pool, &id).await
}

pub async fn fetch_barber(pool: &SqlitePool, id: &str) -> BarberRow {
    sqlx::query_as::<_, BarberRow>("SELECT * FROM barbers WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("fetch barber")
}

pub async fn insert_service(
    pool: &SqlitePool,
    name: &str,
    price: f64,
    duration_minutes: i64,
) -> ServiceRow {
    let id = new_id();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO services (id, name, price, duration_minutes, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(&id)
    .bind(name)
    .bind(price)
    .bind(duration_minutes)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("insert service");

    sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
        .expect("fetch service")
}

pub async fn deactivate_service(pool: &SqlitePool, id: &str) {
    sqlx::query("UPDATE services SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .expect("deactivate service");
}

/// `Authorization: Basic` header value for a test request.
pub fn basic_auth(email: &str, password: &str) -> (&'static str, String) {
    let token = STANDARD.encode(format!("{email}:{password}"));
    ("Authorization", format!("Basic {token}"))
}

/// Builds the full application, wired exactly as `main` wires it, on top of
/// a test pool.
#[macro_export]
macro_rules! test_app {
    ($pool:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($crate::state::AppState::new($pool)))
                .configure($crate::routes::public::configure)
                .configure($crate::routes::barber::configure)
                .configure($crate::routes::admin::configure)
                .configure($crate::routes::client::configure),
        )
        .await
    };
}
