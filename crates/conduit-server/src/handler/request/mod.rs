//! Request types for HTTP handlers.

mod paths;
mod sessions;
mod tools;

pub use paths::*;
pub use sessions::*;
pub use tools::*;
