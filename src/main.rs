use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use playvault::auth::issue_session;
use playvault::config::ServerConfig;
use playvault::server::{AppState, create_router};
use playvault::store::{SqliteStore, Store};
use playvault::types::{Role, User};

#[derive(Parser)]
#[command(name = "playvault")]
#[command(about = "Playground version control and sync server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Days until anonymous playgrounds expire (0 disables expiry)
        #[arg(long, default_value = "30")]
        anonymous_ttl_days: u32,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server database
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print a session token for it
    Add {
        #[arg(long)]
        username: String,

        /// One of: user, sponsor, pro, admin
        #[arg(long, default_value = "user")]
        role: String,

        #[arg(long, default_value = "./data")]
        data_dir: String,
    },
}

fn open_store(data_dir: &str) -> anyhow::Result<SqliteStore> {
    let data_path = PathBuf::from(data_dir);
    fs::create_dir_all(&data_path)?;
    let config = ServerConfig {
        data_dir: data_path,
        ..Default::default()
    };
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    Ok(store)
}

fn validate_username(input: &str) -> Result<(), String> {
    if input.trim().is_empty() {
        Err("Username cannot be empty".to_string())
    } else if input.contains(char::is_whitespace) {
        Err("Username cannot contain whitespace".to_string())
    } else {
        Ok(())
    }
}

fn create_user(store: &dyn Store, username: &str, role: Role) -> anyhow::Result<String> {
    if let Err(message) = validate_username(username) {
        bail!(message);
    }
    if store.get_user_by_username(username)?.is_some() {
        bail!("User '{username}' already exists");
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        role,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user)?;

    let (_, raw_token) = issue_session(store, &user.id, None)?;
    Ok(raw_token)
}

fn print_token(username: &str, raw_token: &str) {
    println!();
    println!("========================================");
    println!("Created user '{username}' with session token:");
    println!();
    println!("  {raw_token}");
    println!();
    println!("========================================");
    println!();
}

fn run_init(data_dir: &str, non_interactive: bool) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;

    if store.has_users()? {
        bail!("Server already initialized in {data_dir}");
    }

    println!("Initialized database in {data_dir}");

    if !non_interactive {
        create_default_user_prompt(&store)?;
    }

    Ok(())
}

fn create_default_user_prompt(store: &SqliteStore) -> anyhow::Result<()> {
    let create = inquire::Confirm::new("Would you like to create an admin user?")
        .with_default(false)
        .prompt()?;

    if !create {
        return Ok(());
    }

    let username = inquire::Text::new("Username:")
        .with_validator(|input: &str| match validate_username(input) {
            Ok(()) => Ok(inquire::validator::Validation::Valid),
            Err(message) => Ok(inquire::validator::Validation::Invalid(message.into())),
        })
        .prompt()?;

    let raw_token = create_user(store, &username, Role::Admin)?;
    print_token(&username, &raw_token);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("playvault=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => {
                run_init(&data_dir, non_interactive)?;
            }
            AdminCommands::User {
                command:
                    UserCommands::Add {
                        username,
                        role,
                        data_dir,
                    },
            } => {
                let Some(role) = Role::parse(&role) else {
                    bail!("Unknown role '{role}'. Expected one of: user, sponsor, pro, admin");
                };
                let store = open_store(&data_dir)?;
                let raw_token = create_user(&store, &username, role)?;
                print_token(&username, &raw_token);
            }
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            anonymous_ttl_days,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
                anonymous_ttl_days: (anonymous_ttl_days > 0).then_some(anonymous_ttl_days),
            };

            fs::create_dir_all(&config.data_dir)?;
            let store = SqliteStore::new(config.db_path())?;
            store.initialize()?;

            if !store.has_users()? {
                tracing::warn!(
                    "No users exist yet. Run 'playvault admin user add' to create one."
                );
            }

            let state = Arc::new(AppState::new(Arc::new(store), config.anonymous_ttl()));

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
