use actix_web::{
    dev::ServiceRequest, error::ErrorForbidden, error::ErrorUnauthorized, web, Error, HttpMessage,
};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{models::Role, state::AppState};

pub const AUTH_REALM: &str = "Navalha";

/// The authenticated identity attached to a request, with its role flags
/// resolved from `user_roles`.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub roles: RoleFlags,
}

/// Role flags are two-phase: a failed lookup yields `Unknown`, which is not
/// the same as checked-and-false and never opens a gated scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleFlags {
    Unknown,
    Known { is_admin: bool, is_barber: bool },
}

impl RoleFlags {
    pub fn is_admin(self) -> bool {
        matches!(self, RoleFlags::Known { is_admin: true, .. })
    }

    pub fn is_barber(self) -> bool {
        matches!(self, RoleFlags::Known { is_barber: true, .. })
    }

    pub fn is_known(self) -> bool {
        matches!(self, RoleFlags::Known { .. })
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn fetch_role_flags(pool: &SqlitePool, user_id: &str) -> RoleFlags {
    let roles = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await;

    match roles {
        Ok(roles) => RoleFlags::Known {
            is_admin: roles.iter().any(|role| role == Role::Admin.as_str()),
            is_barber: roles.iter().any(|role| role == Role::Barber.as_str()),
        },
        Err(err) => {
            log::warn!("Role lookup failed for user {user_id}: {err}");
            RoleFlags::Unknown
        }
    }
}

pub async fn authenticate_credentials(
    pool: &SqlitePool,
    email: &str,
    password: &str,
) -> Option<AuthUser> {
    let user = sqlx::query_as::<_, (String, String, String, String)>(
        r#"SELECT u.id, u.email, u.password_hash, p.full_name
           FROM users u
           JOIN profiles p ON p.user_id = u.id
           WHERE u.email = ?
           LIMIT 1"#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .ok()??;

    let (id, email, password_hash, full_name) = user;
    if !verify_password(password, &password_hash) {
        return None;
    }

    let roles = fetch_role_flags(pool, &id).await;

    Some(AuthUser {
        id,
        email,
        full_name,
        roles,
    })
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<AuthUser, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(&state.db, email, password)
        .await
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if !user.roles.is_admin() {
                return Err((ErrorForbidden("Admin access required"), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

/// Barber scope; admins are let through as well, the handlers still resolve
/// a concrete barber profile before serving anything.
pub async fn barber_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if !user.roles.is_barber() && !user.roles.is_admin() {
                return Err((ErrorForbidden("Barber access required"), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flags_do_not_authorize() {
        let flags = RoleFlags::Unknown;
        assert!(!flags.is_admin());
        assert!(!flags.is_barber());
        assert!(!flags.is_known());
    }

    #[test]
    fn unknown_is_distinct_from_checked_and_false() {
        let unchecked = RoleFlags::Unknown;
        let checked_false = RoleFlags::Known {
            is_admin: false,
            is_barber: false,
        };
        assert_ne!(unchecked, checked_false);
        assert!(checked_false.is_known());
        assert!(!checked_false.is_admin());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[tokio::test]
    async fn credentials_resolve_roles() {
        let pool = crate::db::test_pool().await;
        let user_id = crate::testutil::insert_user(&pool, "ana@example.com", "s3nha!", "Ana").await;
        crate::testutil::grant_role(&pool, &user_id, Role::Barber).await;

        let user = authenticate_credentials(&pool, "ana@example.com", "s3nha!")
            .await
            .expect("authenticated");
        assert_eq!(user.full_name, "Ana");
        assert!(user.roles.is_barber());
        assert!(!user.roles.is_admin());

        assert!(authenticate_credentials(&pool, "ana@example.com", "nope")
            .await
            .is_none());
    }
}
