use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::Role,
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_catalog(pool).await?;
    Ok(())
}

/// Best-effort audit trail; a failed insert is not worth failing the request.
pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    appointment_id: Option<&str>,
) {
    let _ = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, appointment_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(appointment_id)
    .execute(pool)
    .await;
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>(
        "SELECT user_id FROM user_roles WHERE role = ? LIMIT 1",
    )
    .bind(Role::Admin.as_str())
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Ok(());
    }

    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@navalha.local".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let full_name = env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrador".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();
    let user_id = new_id();

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(&user_id)
        .bind(&email)
        .bind(&password_hash)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"INSERT INTO profiles (id, user_id, full_name, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&user_id)
    .bind(&full_name)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("INSERT INTO user_roles (id, user_id, role, created_at) VALUES (?, ?, ?, ?)")
        .bind(new_id())
        .bind(&user_id)
        .bind(Role::Admin.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

/// Optional starter catalog for a fresh install, guarded by SEED_CATALOG=true.
async fn seed_catalog(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let seed = env::var("SEED_CATALOG").unwrap_or_else(|_| "false".to_string());
    if seed != "true" {
        return Ok(());
    }

    let has_services = sqlx::query_as::<_, (String,)>("SELECT id FROM services LIMIT 1")
        .fetch_optional(pool)
        .await?
        .is_some();
    if !has_services {
        let services: [(&str, Option<&str>, f64, i64); 4] = [
            ("Corte Clássico", Some("Corte na tesoura e máquina, com acabamento na navalha."), 45.00, 30),
            ("Barba Completa", Some("Modelagem, toalha quente e hidratação."), 35.00, 25),
            ("Corte + Barba", Some("Combo completo de corte e barba."), 70.00, 50),
            ("Sobrancelha", None, 15.00, 10),
        ];
        for (name, description, price, duration) in services {
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                r#"INSERT INTO services (id, name, description, price, duration_minutes, is_active, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, 1, ?, ?)"#,
            )
            .bind(new_id())
            .bind(name)
            .bind(description)
            .bind(price)
            .bind(duration)
            .bind(&now)
            .bind(&now)
            .execute(pool)
            .await?;
        }
    }

    let has_barbers = sqlx::query_as::<_, (String,)>("SELECT id FROM barbers LIMIT 1")
        .fetch_optional(pool)
        .await?
        .is_some();
    if !has_barbers {
        let barbers: [(&str, Option<&str>); 2] = [
            ("Carlos Mendes", Some("Cortes clássicos")),
            ("Rafael Souza", Some("Degradê e navalhado")),
        ];
        for (name, specialty) in barbers {
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                r#"INSERT INTO barbers (id, name, specialty, slot_interval_minutes, is_active, created_at, updated_at)
                   VALUES (?, ?, ?, 30, 1, ?, ?)"#,
            )
            .bind(new_id())
            .bind(name)
            .bind(specialty)
            .bind(&now)
            .bind(&now)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}
