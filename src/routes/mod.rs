pub mod admin;
pub mod barber;
pub mod client;
pub mod public;

use actix_web::HttpResponse;
use serde_json::json;

pub(crate) fn unprocessable(message: impl AsRef<str>) -> HttpResponse {
    HttpResponse::UnprocessableEntity().json(json!({ "error": message.as_ref() }))
}

pub(crate) fn not_found(message: impl AsRef<str>) -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": message.as_ref() }))
}

pub(crate) fn conflict(message: impl AsRef<str>) -> HttpResponse {
    HttpResponse::Conflict().json(json!({ "error": message.as_ref() }))
}

pub(crate) fn forbidden(message: impl AsRef<str>) -> HttpResponse {
    HttpResponse::Forbidden().json(json!({ "error": message.as_ref() }))
}
