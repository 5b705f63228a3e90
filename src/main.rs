use anyhow::Result;
use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use carrental::connector::user_message;
use carrental::{Commands, Container, ContainerConfig, DomainError, Router};

#[derive(Parser)]
#[command(name = "carrental")]
#[command(author, version, about = "Car rental bookings and fleet administration", long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true, env = "CARRENTAL_DATA_DIR", default_value = "~/.carrental")]
    data_dir: String,

    /// Keep everything in memory for this run only
    #[arg(long, global = true)]
    memory_storage: bool,

    /// Transactions open longer than this fail at commit
    #[arg(long, global = true, env = "CARRENTAL_TX_TIMEOUT_SECS", default_value_t = 30)]
    tx_timeout_secs: u64,

    #[arg(long, global = true, env = "CARRENTAL_BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    bcrypt_cost: u32,

    /// Act as this user id
    #[arg(long = "as", global = true, env = "CARRENTAL_USER")]
    acting_user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = expand_tilde(&cli.data_dir);
    if !cli.memory_storage {
        std::fs::create_dir_all(&data_dir)?;
    }

    let container = Container::new(ContainerConfig {
        data_dir,
        memory_storage: cli.memory_storage,
        tx_timeout_secs: cli.tx_timeout_secs,
        bcrypt_cost: cli.bcrypt_cost,
    })
    .await?;
    let router = Router::new(&container);

    match router.route(cli.command, cli.acting_user).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            if let Some(DomainError::Persistence { message, root_cause }) = e.downcast_ref::<DomainError>() {
                error!("{} (root cause: {})", message, root_cause);
            }
            eprintln!("{}", user_message(&e));
            std::process::exit(1);
        }
    }
}

fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            if path == "~" {
                return home.to_string_lossy().to_string();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
