//! Tops CLI - entrypoint for the certificate pipeline
//!
//! Runs the HTTP API or a one-shot auto-renewal pass against the same
//! configuration file.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AutoRenewCommand, OpenApiCommand, ServeCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "TOPS_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "TOPS_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Renew every due certificate once and exit
    Autorenew(AutoRenewCommand),
    /// Print the OpenAPI document
    Openapi(OpenApiCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.clone();

    // RUST_LOG wins when set; otherwise our crates at the requested level
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "tops_cli={level},\
             tops_acme={level},\
             tops_core={level},\
             tops_config={level},\
             tops_database={level},\
             tops_entities={level},\
             tops_migrations={level},\
             tops_notifications={level},\
             tops_queue={level},\
             tops_vault={level},\
             sqlx=warn,\
             sea_orm=warn,\
             h2=warn,\
             tower=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn,\
             lettre=warn",
            level = log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::Autorenew(renew_cmd) => renew_cmd.execute(),
        Commands::Openapi(openapi_cmd) => openapi_cmd.execute(),
    }
}
