//! Aegis server binary.
//!
//! Loads configuration, opens the store (PostgreSQL when `DATABASE_URL` is
//! set, in memory otherwise), runs startup hooks and serves the API until
//! Ctrl-C.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use aegis_config::{Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions};
use aegis_core::{
    AuthUnitOfWork,
    database::{InMemoryAuthStore, PostgresDatabase},
    notify::LogNotifier,
    time::SystemTimeProvider,
};
use aegis_server::{
    AppState, create_app,
    infra::startup::{ProdStartupHooks, StartupHooks},
};
use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "aegis-server")]
#[command(about = "Account registration, login and role-based access API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to a TOML config file (defaults to ./aegis.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Path to a dotenv file (defaults to ./.env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(&cli.serve)?;

    if let Some(Command::Db(DbCommand::Migrate)) = cli.command {
        return run_db_migrate(&config).await;
    }

    run_server(config, &ProdStartupHooks).await
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Arc<Config>> {
    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config.clone(),
        env_file: args.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aegis_server=info,aegis_core=info,aegis_config=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "configuration file loaded");
    }
    warnings.log();

    Ok(Arc::new(config))
}

async fn connect_postgres(config: &Config) -> anyhow::Result<Option<PostgresDatabase>> {
    let Some(url) = config.database.url.as_deref() else {
        return Ok(None);
    };

    let database = PostgresDatabase::connect(
        url,
        config.database.max_connections,
        config.database.acquire_timeout,
    )
    .await
    .context("failed to connect to PostgreSQL")?;
    database
        .initialize_schema()
        .await
        .context("database migration failed")?;
    Ok(Some(database))
}

async fn run_db_migrate(config: &Config) -> anyhow::Result<()> {
    if connect_postgres(config).await?.is_none() {
        bail!("DATABASE_URL is required to run migrations");
    }
    info!("database migrations applied successfully");
    Ok(())
}

async fn run_server(
    config: Arc<Config>,
    hooks: &dyn StartupHooks,
) -> anyhow::Result<()> {
    let unit_of_work = match connect_postgres(&config).await? {
        Some(database) => {
            info!("using PostgreSQL store");
            AuthUnitOfWork::from_postgres(&database)
        }
        None => {
            warn!("no DATABASE_URL configured; accounts are kept in memory");
            AuthUnitOfWork::in_memory(Arc::new(InMemoryAuthStore::new()))
        }
    };

    let state = AppState::build(
        Arc::clone(&config),
        unit_of_work,
        Arc::new(LogNotifier),
        Arc::new(SystemTimeProvider),
    )?;
    hooks.run(&state).await?;

    let app = create_app(state.clone());
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, dev_mode = config.dev_mode, "aegis server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("shutting down");
    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
