use std::sync::Arc;

use econ_chat::{ChatController, FeedbackLedger, SettingsStore, Terminal, TerminalError};
use econ_chat_backend::{ConfigError, create_client};
use econ_chat_storage::{JsonFileStore, SessionIdentity};
use snafu::{ResultExt, Snafu};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("failed to configure the backend on `{stage}`: {source}"))]
    ConfigureBackend {
        stage: &'static str,
        source: ConfigError,
    },
    #[snafu(display("terminal session failed on `{stage}`: {source}"))]
    RunTerminal {
        stage: &'static str,
        source: TerminalError,
    },
}

#[tokio::main]
async fn main() {
    let settings = Arc::new(SettingsStore::load());
    init_tracing(&settings.settings().log_filter);

    if let Err(error) = run(settings).await {
        tracing::error!(%error, "econ-chat stopped");
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so the transcript on stdout stays clean. `RUST_LOG` wins over settings.
fn init_tracing(log_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(settings: Arc<SettingsStore>) -> Result<(), AppError> {
    let current = settings.settings();
    tracing::info!(
        config_path = ?settings.config_path(),
        endpoint = %current.endpoint,
        "loaded settings"
    );

    let store = match &current.session_store_path {
        Some(path) => JsonFileStore::new(path.clone()),
        None => JsonFileStore::open_default(),
    };
    let identity = SessionIdentity::new(store);
    let session_id = identity.get_or_create_session_id();
    tracing::info!(
        session_id = %session_id,
        origin = ?identity.origin(),
        store = ?identity.store().path(),
        "resolved session identity"
    );

    let client = create_client(current.backend_config()).context(ConfigureBackendSnafu {
        stage: "create-reply-client",
    })?;
    let controller = ChatController::new(client, session_id);

    let mut terminal = Terminal::new(controller, FeedbackLedger::new()).with_settings(settings);
    terminal
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
        .context(RunTerminalSnafu {
            stage: "run-terminal-session",
        })
}
