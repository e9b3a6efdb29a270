//! HTTP server command: `jobtrack serve`.

use anyhow::Result;

use jobtrack::config::TrackerToml;
use jobtrack::tracker::server::start_server;

pub async fn cmd_serve(settings: &TrackerToml) -> Result<()> {
    for warning in settings.validate() {
        tracing::warn!("{}", warning);
    }
    if settings.users.is_empty() {
        tracing::warn!("no users configured; status updates will be rejected until users exist");
    }

    println!(
        "{} http://{}:{}",
        console::style("Job tracker starting at").bold().cyan(),
        settings.server.host,
        settings.server.port
    );
    start_server(settings.server_config()).await
}
