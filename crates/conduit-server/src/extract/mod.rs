//! Request extractors answering rejections with [`Error`].
//!
//! Drop-in replacements for the axum extractors of the same name that turn
//! rejections into JSON error responses and document themselves for OpenAPI.
//!
//! [`Error`]: crate::handler::Error

mod json;
mod path;
mod query;

pub use crate::extract::json::Json;
pub use crate::extract::path::Path;
pub use crate::extract::query::Query;

/// Keeps the first lines of a rejection message, bounded in length.
fn sanitize_error_message(message: &str, lines: usize, chars: usize) -> String {
    message
        .lines()
        .take(lines)
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(chars)
        .collect()
}
