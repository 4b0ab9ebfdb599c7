//! HTTP server command (`sketchforge serve`).

use anyhow::Result;

use sketchforge::config::ServiceConfig;
use sketchforge::service::server::start_server;

pub async fn cmd_serve(config: ServiceConfig, open: bool) -> Result<()> {
    start_server(config, open).await
}
