//! predict-core entry point.
//!
//! ## CLI Subcommands
//!
//! - `predict-core config show` - Print effective configuration as JSON
//! - `predict-core check` - Load config, build the runtime, print a health report
//! - `predict-core version` - Print version
//! - `predict-core help` - Print usage

use std::process::ExitCode;

use predict_core::config;
use predict_core::telemetry::{describe_metrics, init_logging};
use predict_core::Runtime;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => run_config_show(),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "check" => run_check().await,
        "version" | "--version" | "-V" => {
            println!("predict-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn run_config_show() -> ExitCode {
    let rendered = config::load().and_then(|cfg| cfg.effective_json());
    match rendered {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run_check() -> ExitCode {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Err(e) = init_logging(&cfg.log) {
        eprintln!("Logging error: {}", e);
        return ExitCode::from(2);
    }
    describe_metrics();

    let runtime = Runtime::new(cfg);
    let (feed, lifecycle) = runtime.spawn_loader_feed();
    tracing::info!(
        max_versions = runtime.config().max_versions,
        event_capacity = runtime.config().event_capacity,
        "runtime assembled"
    );

    let report = runtime.health_report();
    drop(feed);
    if let Err(e) = lifecycle.await {
        tracing::warn!(error = %e, "loader feed task did not finish cleanly");
    }
    runtime.shutdown().await;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to render health report: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if report.ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "predict-core - model resolution and dispatch core v{}

USAGE:
    predict-core <COMMAND>

COMMANDS:
    config show  Print effective configuration as JSON
    check        Build the runtime and print a health report (exit 0 if ready)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    PREDICT_CORE_CONFIG                TOML config file, overridden by the variables below
    PREDICT_CORE_MAX_VERSIONS          Versions kept per model, 0 = unlimited (default: 2)
    PREDICT_CORE_AVAILABILITY_WAIT_MS  Wait for a first version, 0 = fail fast (default: 0)
    PREDICT_CORE_DEFAULT_TIMEOUT_MS    Default request deadline, 0 = none (default: 0)
    PREDICT_CORE_EVENT_CAPACITY        Loader feed capacity (default: 64)
    PREDICT_CORE_SHUTDOWN_TIMEOUT      Drain timeout in seconds (default: 30)
    PREDICT_CORE_LOG_LEVEL             Tracing filter (default: info)
    PREDICT_CORE_LOG_FORMAT            json or pretty (default: json)

EXIT CODES:
    0  Success / Ready
    1  Failure / Not ready
    2  Configuration error
",
        version
    );
}
