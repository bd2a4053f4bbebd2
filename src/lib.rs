#[cfg(feature = "api")]
pub mod api;

pub mod config;
pub mod observer;
pub mod server;
pub mod statistics;

use std::sync::Arc;

use self::{config::Config, statistics::Statistics};

/// Opens a function to replace `main` so integration tests can start the
/// proxy directly against the library crate.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    let statistics = Statistics::default();

    #[cfg(feature = "api")]
    {
        api::start_server(statistics.clone()).await?;
    }

    server::start(config, statistics).await
}
