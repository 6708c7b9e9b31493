use alepe_mcp::config::LogLevel;
use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("alepe-mcp")
        .about("MCP server for the ALEPE open-data API (stdio JSON-RPC)")
        .disable_version_flag(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .value_parser(|s: &str| s.parse::<LogLevel>())
                .help("Log level (error, warn, info, debug, trace); overrides RUST_LOG and LOG_LEVEL"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Run one health check against the API, print the report and exit")
                .action(ArgAction::SetTrue),
        )
}

/// Logs go to stderr; stdout carries the protocol.
/// Precedence: explicit level, then RUST_LOG, then the configured default.
pub fn init_logging(level: Option<LogLevel>, default: LogLevel) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    match level {
        Some(lvl) => {
            builder.filter_level(lvl.as_filter());
        }
        None => match std::env::var("RUST_LOG") {
            Ok(spec) if !spec.trim().is_empty() => {
                builder.parse_filters(&spec);
            }
            _ => {
                builder.filter_level(default.as_filter());
            }
        },
    }
    builder.init();
}
