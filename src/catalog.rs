use sqlx::SqlitePool;

use crate::models::{BarberRow, ServiceRow};

/// Active barbers, ordered by name. A snapshot: concurrent admin edits are
/// not reflected until the next read.
pub async fn list_active_barbers(pool: &SqlitePool) -> Result<Vec<BarberRow>, sqlx::Error> {
    sqlx::query_as::<_, BarberRow>(
        "SELECT * FROM barbers WHERE is_active = 1 ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// Active services, ordered by name.
pub async fn list_active_services(pool: &SqlitePool) -> Result<Vec<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(
        "SELECT * FROM services WHERE is_active = 1 ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

pub async fn fetch_active_barber(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<BarberRow>, sqlx::Error> {
    sqlx::query_as::<_, BarberRow>("SELECT * FROM barbers WHERE id = ? AND is_active = 1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Active services among the given ids, in no particular order. Ids that do
/// not resolve are simply absent from the result.
pub async fn fetch_active_services_by_ids(
    pool: &SqlitePool,
    ids: &[String],
) -> Result<Vec<ServiceRow>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT * FROM services WHERE is_active = 1 AND id IN ({placeholders})");
    let mut query = sqlx::query_as::<_, ServiceRow>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    query.fetch_all(pool).await
}
