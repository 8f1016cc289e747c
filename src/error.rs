//! Error handling.

use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ndarray::ShapeError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

use crate::container::FormatError;

/// simstage server error type
///
/// This type encapsulates the various errors that may occur while locating, staging, decoding or
/// transcoding remote data. Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum SimStageError {
    /// More than one archive item matches a timestep
    #[error("found {count} items named {name}, expected exactly one")]
    AmbiguousResult { name: String, count: usize },

    /// Missing or invalid request parameter
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    /// A staged archive could not be opened or extracted
    #[error("failed to extract archive {path}")]
    CorruptArchive {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The external encoder failed
    #[error("video encoding failed: {detail}")]
    EncodingFailed { detail: String },

    /// The asset store denied access to a resource
    #[error("access to {resource} is forbidden")]
    Forbidden { resource: String },

    /// Local I/O error
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Error joining a blocking task
    #[error("error executing blocking task")]
    Join(#[from] tokio::task::JoinError),

    /// A timestep item name without an integer prefix
    #[error("item name {name} does not start with an integer timestep")]
    MalformedName { name: String },

    /// No frames to encode
    #[error("no SVG or PNG frames found in {dir}")]
    NoFramesFound { dir: String },

    /// Missing folder, item or timestep
    #[error("{what} not found")]
    NotFound { what: String },

    /// Invalid path parameters
    #[error("request path is not valid")]
    PathRejection(#[from] PathRejection),

    /// Invalid glob pattern
    #[error("invalid file pattern")]
    PatternInvalid(#[from] glob::PatternError),

    /// Error deserialising query parameters
    #[error("request query is not valid")]
    QueryRejection(#[from] QueryRejection),

    /// Error validating query parameters
    #[error("request query is not valid")]
    QueryValidation(#[from] validator::ValidationErrors),

    /// Error communicating with the asset store
    #[error("error communicating with the asset store")]
    RemoteRequest(#[from] reqwest::Error),

    /// Unexpected response from the asset store
    #[error("asset store request failed with status {status}: {message}")]
    RemoteStore { status: u16, message: String },

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Error creating ndarray Array from Shape
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// The asset store rejected the token
    #[error("not authorised to access {resource}")]
    Unauthorised { resource: String },

    /// A container file that is missing, truncated or in an unexpected format
    #[error("failed to read container {path}")]
    UnreadableContainer {
        path: String,
        #[source]
        source: FormatError,
    },

    /// Requested variable is absent from the container
    #[error("variable {name} not found in container")]
    VariableNotFound { name: String },
}

impl SimStageError {
    /// Return a `NotFound` error for a description of the missing entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        SimStageError::NotFound { what: what.into() }
    }

    /// Return an `UnreadableContainer` error for a container path.
    pub fn unreadable(path: impl AsRef<std::path::Path>, source: FormatError) -> Self {
        SimStageError::UnreadableContainer {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl IntoResponse for SimStageError {
    /// Convert from a `SimStageError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut causes = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            causes.push(source.to_string());
            current = source.source();
        }
        // Remove duplicate entries.
        causes.dedup();
        let caused_by = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }
}

/// Map an error to the HTTP status code it is reported with.
fn status_code(error: &SimStageError) -> StatusCode {
    match error {
        // Bad request
        SimStageError::BadRequest { reason: _ }
        | SimStageError::PathRejection(_)
        | SimStageError::QueryRejection(_)
        | SimStageError::QueryValidation(_) => StatusCode::BAD_REQUEST,

        // Unauthorised
        SimStageError::Unauthorised { resource: _ } => StatusCode::UNAUTHORIZED,

        // Forbidden
        SimStageError::Forbidden { resource: _ } => StatusCode::FORBIDDEN,

        // Not found
        SimStageError::NotFound { what: _ }
        | SimStageError::VariableNotFound { name: _ }
        | SimStageError::NoFramesFound { dir: _ } => StatusCode::NOT_FOUND,

        // Conflict
        SimStageError::AmbiguousResult { name: _, count: _ } => StatusCode::CONFLICT,

        // Internal server error
        SimStageError::CorruptArchive { path: _, source: _ }
        | SimStageError::EncodingFailed { detail: _ }
        | SimStageError::Io(_)
        | SimStageError::Join(_)
        | SimStageError::MalformedName { name: _ }
        | SimStageError::PatternInvalid(_)
        | SimStageError::RemoteRequest(_)
        | SimStageError::RemoteStore {
            status: _,
            message: _,
        }
        | SimStageError::SemaphoreAcquireError(_)
        | SimStageError::ShapeInvalid(_)
        | SimStageError::UnreadableContainer { path: _, source: _ } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<SimStageError> for ErrorResponse {
    /// Convert from a `SimStageError` into an `ErrorResponse`.
    fn from(error: SimStageError) -> Self {
        let response = Self::new(status_code(&error), &error);

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
