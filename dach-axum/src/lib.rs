//! dach-axum: Axum adapter for Dach add-ons.
//!
//! Mounts the descriptor, install and uninstall endpoints of each
//! configured add-on and maps handshake failures onto HTTP responses.

pub mod app;
pub mod descriptor;
pub mod routes;
pub mod state;
mod error;
pub use error::DachAxumError;
pub use state::DachAxumState;

pub use app::{axum, AxumApp};
pub use descriptor::{DescriptorSource, FileDescriptorSource};
