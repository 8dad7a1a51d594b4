//! Response types for HTTP handlers.

mod error_response;
mod monitors;
mod providers;
mod sessions;
mod tools;

pub use error_response::ErrorResponse;
pub use monitors::*;
pub use providers::*;
pub use sessions::*;
pub use tools::*;
