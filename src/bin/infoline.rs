use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use infoline::{
    app::{create_router, AppStateBuilder},
    config::Config,
    handler::middleware::request_log::AccessLogEventFormat,
    version,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{
    fmt::time::LocalTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version = version::get_short_version(),
    about = "Telephone information line with operator escalation",
    long_about = version::get_version_info()
)]
struct Cli {
    /// Path to the configuration file
    #[clap(
        long,
        global = true,
        help = "Path to the configuration file (TOML format)"
    )]
    conf: Option<String>,
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit without starting the server
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.conf {
        println!("Loading config from: {}", path);
        Config::load(path).expect("Failed to load config")
    } else {
        println!("Loading default config");
        Config::default()
    };

    println!("Start at {}", Utc::now());
    println!("{}", version::get_version_info());

    if matches!(cli.command, Some(Commands::CheckConfig)) {
        match config.validate() {
            Ok(_) => {
                println!("Configuration is valid.");
                return Ok(());
            }
            Err(err) => {
                eprintln!("Configuration validation failed: {}", err);
                std::process::exit(1);
            }
        }
    }

    let mut env_filter = EnvFilter::from_default_env();
    if let Some(Ok(level)) = config
        .log_level
        .as_ref()
        .map(|level| level.parse::<LevelFilter>())
    {
        env_filter = env_filter.add_directive(level.into());
    }
    env_filter = env_filter.add_directive("sqlx=warn".parse().expect("valid directive"));

    let mut guard_holder = None;
    if let Some(ref log_file) = config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .expect("Failed to open log file");
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        guard_holder = Some(guard);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(AccessLogEventFormat::new(LocalTime::rfc_3339()))
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(AccessLogEventFormat::new(LocalTime::rfc_3339())),
            )
            .try_init()?;
    }
    let _ = guard_holder; // keep the guard alive

    let state = AppStateBuilder::new().with_config(config).build().await?;
    info!("starting infoline on {}", state.config.http_addr);
    let router = create_router(state.clone());
    let mut app_future = Box::pin(infoline::app::run(state.clone(), router));

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).expect("failed to install signal handler")
    };

    #[cfg(unix)]
    {
        tokio::select! {
            result = &mut app_future => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("received CTRL+C, shutting down");
                state.token.cancel();
                let _ = app_future.await;
            }
            _ = sigterm_stream.recv() => {
                info!("received SIGTERM, shutting down");
                state.token.cancel();
                let _ = app_future.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = &mut app_future => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("received CTRL+C, shutting down");
                state.token.cancel();
                let _ = app_future.await;
            }
        }
    }

    Ok(())
}
