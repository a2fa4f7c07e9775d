mod app;
pub mod config;

use anyhow::Result;
use dach_axum::AxumApp;

pub use config::EchoSettings;

/// Assemble the echo add-on: lifecycle endpoints under `/echo/setup` and a
/// `/health` probe.
pub fn build(settings: EchoSettings) -> Result<AxumApp> {
    app::echo_app(settings)
}
