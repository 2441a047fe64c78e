//! Binary entry point for `support-bot`.
//!
//! This module provides the command-line interface for support-bot with options
//! for configuration file paths and logging verbosity. It initializes the
//! necessary components and starts the service.

use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use support_bot::base::{config::Config, types::Void};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// Support-bot: answers customer support questions in Slack.
///
/// Configuration comes from environment variables (a `.env` file is loaded
/// first, if present) and, optionally, a TOML config file. Every message in
/// the channels the bot is a member of is answered from the support document
/// index.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// Use multiple times to increase verbosity:
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Main entry point for the support-bot binary.
///
/// Sets up logging based on verbosity, loads configuration, and starts the bot.
#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    // Pick up secrets from a local `.env`, if there is one.
    let dotenv = dotenvy::dotenv();

    init_tracing(args.verbose)?;

    if let Some(err) = unexpected_dotenv_error(dotenv) {
        tracing::warn!("Failed to load `.env`: {}", err);
    }

    let config = Config::load(args.config.as_deref())?;

    support_bot::start(config).await
}

/// A missing `.env` is fine; anything else (a malformed line, an unreadable file) is worth a warning.
fn unexpected_dotenv_error<T>(result: Result<T, dotenvy::Error>) -> Option<dotenvy::Error> {
    match result {
        Err(err) if !err.not_found() => Some(err),
        _ => None,
    }
}

/// Install the stdout log layer, plus an OTLP span exporter when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
fn init_tracing(verbose: u8) -> Void {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    // Prepare the log layer.

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Prepare the otlp layer.

    let otel = if std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
        let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("support-bot");
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    Ok(())
}

// Tests.
