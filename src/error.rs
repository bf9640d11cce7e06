use std::fmt::Display;

use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::{json, Json},
    Request, Response,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    /// A payload field failed validation.
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// A validation failure for the named field.
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Display) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Status(Status::Unauthorized, message.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature
                | JwtErrorKind::ImmatureSignature
                | JwtErrorKind::InvalidSignature
                | JwtErrorKind::InvalidToken => Status::Unauthorized,
                _ => Status::InternalServerError,
            },
            Self::Validation { .. } => Status::BadRequest,
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let body = if status.class() == StatusClass::ServerError {
            // Don't leak database internals to the client.
            error!("{self}");
            json!({ "error": status.reason().unwrap_or("Internal Server Error") })
        } else {
            warn!("{self}");
            match &self {
                Self::Validation { field, message } => json!({ "error": message, "field": field }),
                _ => json!({ "error": self.to_string() }),
            }
        };

        Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            Error::field("end_date", "in the past").status(),
            Status::BadRequest
        );
        assert_eq!(Error::not_found("Poll 3").status(), Status::NotFound);
        assert_eq!(Error::unauthorized("who?").status(), Status::Unauthorized);
    }

    #[test]
    fn messages() {
        assert_eq!(Error::not_found("Poll 3").to_string(), "Poll 3 not found");
        assert_eq!(
            Error::field("answer_data", "duplicate option values").to_string(),
            "duplicate option values"
        );
    }

    #[test]
    fn validation_names_field() {
        assert!(matches!(
            Error::field("type", "cannot change"),
            Error::Validation { field: "type", .. }
        ));
    }
}
