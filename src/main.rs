use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::net::TcpListener;

use portal_chat::common::{Role, UserId, UserProfile};
use portal_chat::config::{self, AppConfig};
use portal_chat::network::{self, AppState};
use portal_chat::storage::SqliteStore;

#[derive(Parser)]
#[command(
    name = "portal_chat",
    version,
    about = "Realtime direct messaging service for the job platform"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Override the listen address (host:port)
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
    /// Override the SQLite database path
    #[arg(long, value_name = "FILE")]
    database: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Command {
    /// Run the HTTP + WebSocket server (default)
    Serve,
    /// Add or update a chat-capable user profile
    AddUser {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "student")]
        role: Role,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Write the effective configuration to the config file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = effective_config(&cli);

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => run_server(app_config).await,
        Command::AddUser {
            id,
            name,
            role,
            avatar,
        } => add_user(&app_config, id, name, role, avatar).await,
        Command::InitConfig => {
            config::save_config(&cli.config, &app_config)?;
            log::info!("Wrote configuration to {}", cli.config);
            Ok(())
        }
    }
}

fn effective_config(cli: &Cli) -> AppConfig {
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env(|key| std::env::var(key).ok());
    if let Some(listen) = &cli.listen {
        app_config.listen_addr = listen.clone();
    }
    if let Some(database) = &cli.database {
        app_config.database_path = database.clone();
    }
    app_config
}

async fn run_server(app_config: AppConfig) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(SqliteStore::open(&app_config.database_path)?);
    log::info!("Message store opened at {}", app_config.database_path);

    let state = AppState::new(store.clone(), store);
    let listener = TcpListener::bind(&app_config.listen_addr).await?;

    network::serve(listener, state, shutdown_signal()).await?;
    log::info!("Chat server stopped");
    Ok(())
}

async fn add_user(
    app_config: &AppConfig,
    id: String,
    name: String,
    role: Role,
    avatar: Option<String>,
) -> Result<(), Box<dyn Error>> {
    if !network::identity::is_valid_user_id(&id) {
        return Err(format!("invalid user id `{id}`").into());
    }

    let store = SqliteStore::open(&app_config.database_path)?;
    store
        .upsert_user(UserProfile {
            id: UserId::new(id.clone()),
            name,
            avatar,
            role,
        })
        .await?;
    log::info!("User {id} saved as {role}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
