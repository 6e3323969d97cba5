use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use arcanus_bot::application::errors::ErrorKind;
use arcanus_bot::application::messaging::{Context, Outcome, Pipeline};
use arcanus_bot::application::services::{BotHandler, RateLimiter, UserService};
use arcanus_bot::domain::entities::{InboundUpdate, Sender};
use arcanus_bot::infrastructure::adapters::ConsoleAdapter;
use arcanus_bot::infrastructure::audit::AuditLogger;
use arcanus_bot::infrastructure::config::Config;
use arcanus_bot::infrastructure::logging;
use arcanus_bot::infrastructure::storage::MemoryStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "arcanus-bot")]
#[command(about = "Chat bot request pipeline with rate limiting and audit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot on the console
    Run {
        /// User id the console speaks as
        #[arg(long, default_value_t = 1)]
        user_id: i64,

        /// Username the console speaks as
        #[arg(long, default_value = "console_user")]
        username: String,
    },
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { user_id, username } => {
            let sender = Sender::new(user_id, username.clone()).with_username(username);
            if let Err(e) = run_bot(&cli.config, sender) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("arcanus-bot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            if let Err(e) = init_config() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_config(path: &str) -> Result<Config, BoxError> {
    let config = if Path::new(path).exists() {
        let mut config = Config::load(path)?;
        config.apply_env();
        config
    } else {
        Config::load_env()
    };
    config.validate()?;
    Ok(config)
}

fn run_bot(config_path: &str, sender: Sender) -> Result<(), BoxError> {
    let config = load_config(config_path)?;
    logging::init(&config.logging)?;

    tracing::info!(
        name = %config.bot.name,
        timeout_secs = config.pipeline.timeout_seconds,
        max_requests = config.security.rate_limit.max_requests,
        "Starting arcanus-bot"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_console(config, sender));
    // A pending stdin read lives on a blocking thread; don't wait for it
    rt.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}

async fn run_console(config: Config, sender: Sender) {
    let limiter = Arc::new(RateLimiter::new(config.security.rate_limit.clone()));
    limiter.start_sweeper();

    let audit = Arc::new(AuditLogger::from_config(&config.security.audit));
    let bot = Arc::new(ConsoleAdapter::new(config.bot.name.clone()));
    let users = UserService::new(Arc::new(MemoryStore::new()));
    let handler = Arc::new(BotHandler::new(bot.clone(), users).with_audit(audit.clone()));
    let pipeline = Pipeline::new(handler, limiter.clone(), audit.clone(), config.pipeline.timeout());

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    println!("Console mode. Type /start, /account, /help, or cb:<data> to press a button (e.g. cb:trial).");

    let chat_id = sender.id;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        };

        let Some(update) = bot.parse_line(chat_id, &sender, &line) else {
            continue;
        };
        let payload = match &update {
            InboundUpdate::Message { text, .. } => (false, text.clone()),
            InboundUpdate::Callback { data, .. } => (true, data.clone()),
        };

        let outcome = pipeline
            .dispatch(Context::with_token(shutdown.child_token()), update)
            .await;
        record_outcome(&audit, &sender, payload, outcome);
        notify_user(outcome);
    }

    limiter.shutdown().await;
    audit.shutdown().await;
    tracing::info!("Bot stopped");
}

/// Resolves on Ctrl+C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn record_outcome(audit: &AuditLogger, sender: &Sender, (is_callback, payload): (bool, String), outcome: Outcome) {
    let username = sender.username.as_deref().unwrap_or_default();
    let error = match outcome {
        Outcome::Succeeded => None,
        Outcome::Failed(kind) | Outcome::Rejected(kind) => Some(kind.as_str()),
    };

    if outcome == Outcome::Rejected(ErrorKind::RateLimitExceeded) {
        audit.log_security_event(
            sender.id,
            username,
            "rate_limited",
            serde_json::json!({ "payload": payload }),
        );
    }

    if is_callback {
        audit.log_callback(sender.id, username, &payload, outcome.is_success(), error);
    } else {
        audit.log_command(sender.id, username, &payload, outcome.is_success(), error);
    }
}

/// User-facing notice for outcomes the handler did not answer itself
fn notify_user(outcome: Outcome) {
    let notice = match outcome {
        Outcome::Rejected(ErrorKind::RateLimitExceeded) => {
            "Too many requests. Please wait a few minutes and try again."
        }
        Outcome::Failed(ErrorKind::Timeout) => "The request took too long. Please try again.",
        Outcome::Failed(ErrorKind::Internal) => "Something went wrong. Please try again.",
        _ => return,
    };
    println!("[BOT] {}", notice);
}

fn init_config() -> Result<(), BoxError> {
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);
    println!("\nSave this to config.yaml and adjust as needed.");
    Ok(())
}
