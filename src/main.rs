mod cli;

use alepe_mcp::config::{LogLevel, Settings};
use alepe_mcp::http::AlepeClient;
use alepe_mcp::server;
use anyhow::Context;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();
    let log_level = matches.get_one::<LogLevel>("log-level").copied();

    if matches.get_flag("version") {
        println!("alepe-mcp {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // A missing .env is fine; real environment variables win over it.
    let _ = dotenvy::dotenv();
    let settings = Settings::from_env().context("invalid configuration")?;
    cli::init_logging(log_level, settings.log_level());

    if matches.get_flag("check") {
        return check(settings).await;
    }

    server::run_stdio_server(settings).await
}

async fn check(settings: Settings) -> anyhow::Result<()> {
    let client = AlepeClient::new(settings).context("failed to build HTTP client")?;
    let report = client.health_check().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_healthy() {
        anyhow::bail!("ALEPE API at {} is unhealthy", report.api_url);
    }
    Ok(())
}
