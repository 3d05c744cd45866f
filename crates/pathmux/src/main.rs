//! pathmux command line.
//!
//! Validates route tables, resolves single requests against them, and
//! serves them as a mock HTTP server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pathmux_telemetry::{log_listening, log_routes_loaded, log_startup, LogFormat, Telemetry, TelemetryConfig};
use tokio::net::TcpListener;

use pathmux_lib::mux::method_label;
use pathmux_lib::reload::shared;
use pathmux_lib::{server, Dispatch, MuxConfig, RouteTable, RouteWatcher};

/// Listen address when neither the CLI nor the route table sets one.
const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "pathmux", about = "Pattern-routing HTTP mock server", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that every route in a table compiles and none conflict.
    Validate {
        /// Route table file (YAML).
        #[arg(short, long)]
        routes: PathBuf,

        /// Output format (text or json).
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Resolve one request against a route table and print the outcome.
    Match {
        /// Route table file (YAML).
        #[arg(short, long)]
        routes: PathBuf,

        /// Request method.
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request path.
        path: String,
    },

    /// Serve a route table.
    Serve {
        /// Route table file (YAML).
        #[arg(short, long)]
        routes: PathBuf,

        /// Listen address; overrides the route table's `listen`.
        #[arg(long)]
        listen: Option<String>,

        /// Log level.
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Log format (json or pretty).
        #[arg(long, default_value = "json")]
        log_format: String,

        /// Reload the route table when the file changes.
        #[arg(long)]
        watch: bool,
    },
}

/// Validation result for a route table file.
#[derive(serde::Serialize)]
struct ValidationResult {
    file: String,
    valid: bool,
    routes: usize,
    patterns: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the validate command.
fn run_validate(routes: &Path, output_format: &str) -> ExitCode {
    let file = routes.display().to_string();
    let outcome = RouteTable::load(routes)
        .and_then(|table| {
            let mux = table.build_mux(&MuxConfig::default())?;
            Ok((table, mux))
        });

    let result = match &outcome {
        Ok((table, mux)) => ValidationResult {
            file,
            valid: true,
            routes: table.routes.len(),
            patterns: mux.len(),
            error: None,
        },
        Err(e) => ValidationResult {
            file,
            valid: false,
            routes: 0,
            patterns: 0,
            error: Some(e.to_string()),
        },
    };

    if output_format == "json" {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to encode result: {}", e);
                return ExitCode::from(1);
            }
        }
    } else {
        match &outcome {
            Ok((_, mux)) => {
                println!(
                    "{}: ok ({} route(s), {} pattern(s))",
                    result.file, result.routes, result.patterns
                );
                for (pattern, methods) in mux.routes() {
                    let methods: Vec<&str> = methods.methods().map(method_label).collect();
                    println!("  {:<24} {}", methods.join(","), pattern);
                }
            }
            Err(e) => eprintln!("error: {}: {}", result.file, e),
        }
    }

    if result.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Run the match command.
fn run_match(routes: &Path, method: &str, path: &str) -> ExitCode {
    let mux = match RouteTable::load(routes).and_then(|t| t.build_mux(&MuxConfig::default())) {
        Ok(mux) => mux,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    let (outcome, code) = match mux.dispatch(method, path) {
        Dispatch::Found {
            pattern, params, ..
        } => {
            let params: serde_json::Map<String, serde_json::Value> = params
                .to_map()
                .into_iter()
                .map(|(name, value)| (name, serde_json::Value::String(value)))
                .collect();
            (
                serde_json::json!({
                    "outcome": "found",
                    "pattern": pattern,
                    "params": params,
                }),
                ExitCode::SUCCESS,
            )
        }
        // `serve` answers these itself, so they are not failures.
        Dispatch::MethodNotAllowed { pattern, allowed } if mux.answers_options(method) => (
            serde_json::json!({
                "outcome": "options",
                "pattern": pattern,
                "allowed": allowed,
            }),
            ExitCode::SUCCESS,
        ),
        Dispatch::MethodNotAllowed { pattern, allowed } => (
            serde_json::json!({
                "outcome": "method_not_allowed",
                "pattern": pattern,
                "allowed": allowed,
            }),
            ExitCode::from(1),
        ),
        Dispatch::NotFound => (
            serde_json::json!({ "outcome": "not_found" }),
            ExitCode::from(1),
        ),
    };

    println!("{}", outcome);
    code
}

/// Run the serve command.
async fn run_serve(
    routes: &Path,
    listen: Option<String>,
    log_level: String,
    log_format: &str,
    watch: bool,
) -> ExitCode {
    let Some(log_format) = LogFormat::parse(log_format) else {
        eprintln!("error: invalid log format: {}", log_format);
        return ExitCode::from(1);
    };
    let telemetry_config = TelemetryConfig::new()
        .with_log_level(log_level)
        .with_log_format(log_format);
    let telemetry = match Telemetry::init(telemetry_config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    log_startup!(
        service = %telemetry.config().service_name,
        version = env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let mux_config = MuxConfig::default();
    let table = match RouteTable::load(routes) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };
    let mux = match table.build_mux(&mux_config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    log_routes_loaded!(
        path = %routes.display(),
        routes = table.routes.len(),
        patterns = mux.len(),
        "route table loaded"
    );

    let listen = listen
        .or(table.listen)
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    let addr: SocketAddr = match listen.parse() {
        Ok(a) => a,
        Err(_) => {
            eprintln!("error: invalid listen address: {}", listen);
            return ExitCode::from(1);
        }
    };

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: failed to bind to {}: {}", addr, e);
            return ExitCode::from(1);
        }
    };

    let shared_mux = shared(mux);

    // Dropping the watcher stops it, so it lives until the server returns.
    let _watcher = if watch {
        match RouteWatcher::new(routes, mux_config, shared_mux.clone()).run() {
            Ok(w) => Some(w),
            Err(e) => {
                eprintln!("error: failed to watch {}: {}", routes.display(), e);
                return ExitCode::from(1);
            }
        }
    } else {
        None
    };

    log_listening!(address = %addr, "listening");

    server::serve(listener, shared_mux, shutdown_signal()).await;
    ExitCode::SUCCESS
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { routes, format } => run_validate(&routes, &format),
        Commands::Match {
            routes,
            method,
            path,
        } => run_match(&routes, &method, &path),
        Commands::Serve {
            routes,
            listen,
            log_level,
            log_format,
            watch,
        } => run_serve(&routes, listen, log_level, &log_format, watch).await,
    }
}
