//! HTTP status codes the dispatch pipeline produces.
//!
//! Anything that accepts a status takes `impl Into<u16>`, so a bare code
//! attached to an endpoint error (say `418`) works just as well as a named
//! variant:
//!
//! ```rust
//! use restmount::{Response, Status};
//!
//! Response::status(Status::NoContent);
//! Response::status(418u16);
//! ```

/// Named status codes used by the registry and the default resource hooks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,                   // 200
    Created,              // 201
    NoContent,            // 204
    BadRequest,           // 400
    Unauthorized,         // 401
    Forbidden,            // 403
    NotFound,             // 404
    MethodNotAllowed,     // 405
    UnsupportedMediaType, // 415
    ClientClosedRequest,  // 499 (nginx)
    InternalServerError,  // 500
    ServiceUnavailable,   // 503
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::Ok                   => 200,
            Status::Created              => 201,
            Status::NoContent            => 204,
            Status::BadRequest           => 400,
            Status::Unauthorized         => 401,
            Status::Forbidden            => 403,
            Status::NotFound             => 404,
            Status::MethodNotAllowed     => 405,
            Status::UnsupportedMediaType => 415,
            Status::ClientClosedRequest  => 499,
            Status::InternalServerError  => 500,
            Status::ServiceUnavailable   => 503,
        }
    }
}

/// Converts an arbitrary code into a wire status.
///
/// Codes outside `100..=999` cannot be sent and collapse to `500`.
pub(crate) fn to_status_code(code: u16) -> http::StatusCode {
    http::StatusCode::from_u16(code).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
}
