//! Domain layer: models, ports and error types shared by all services.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ConnectionError, SessionError};
