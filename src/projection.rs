//! Projection of pipeline results into HTTP responses.

use crate::array::{build_array, to_nested_json, Element};
use crate::container::{Values, Variable};
use crate::error::SimStageError;
use crate::scratch::ScratchFile;

use axum::{
    body::StreamBody,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;

/// Render values of one element type with the given shape.
fn values_to_json<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Value, SimStageError> {
    let array = build_array(shape, values)?;
    Ok(to_nested_json(array.view()))
}

impl Variable {
    /// Convert into nested JSON arrays matching the variable's shape.
    pub fn into_json(self) -> Result<Value, SimStageError> {
        let shape = &self.shape;
        match self.values {
            Values::Byte(v) => values_to_json(shape, v),
            Values::Short(v) => values_to_json(shape, v),
            Values::Int(v) => values_to_json(shape, v),
            Values::Float(v) => values_to_json(shape, v),
            Values::Double(v) => values_to_json(shape, v),
        }
    }
}

/// Serialise a value as a JSON response body, with no wrapping.
pub fn as_json<T: Serialize>(value: T) -> Response {
    Json(value).into_response()
}

/// A stream that holds a guard until the stream itself is dropped.
struct ScopedStream<S, G> {
    inner: S,
    _guard: G,
}

impl<S: Stream + Unpin, G: Unpin> Stream for ScopedStream<S, G> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// Stream a scratch file as the response body.
///
/// The file is deleted once the body has been sent or abandoned, never before.
///
/// # Arguments
///
/// * `file`: Scratch file to stream
/// * `mime_type`: Content type of the response
pub fn as_media_stream(file: ScratchFile, mime_type: &str) -> Result<Response, SimStageError> {
    let reader = file.reopen()?;
    let length = reader.metadata()?.len();
    let stream = ScopedStream {
        inner: ReaderStream::new(tokio::fs::File::from_std(reader)),
        _guard: file,
    };
    Ok((
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        StreamBody::new(stream),
    )
        .into_response())
}
