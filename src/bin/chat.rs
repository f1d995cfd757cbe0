use std::path::PathBuf;

use clap::Parser;
use nibot_chat::config::{
    default_state_dir, ChatConfig, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP,
};
use nibot_chat::i18n::{Lang, Locale};
use tracing::error;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal chat client for a nibot agent backend")]
struct Args {
    /// Base HTTP(S) URL of the backend; the websocket channel and the
    /// fallback endpoint are derived from it.
    #[arg(long, env = "NIBOT_CHAT_SERVER", default_value = "http://127.0.0.1:8080")]
    server: Url,
    /// UI language ("en" or "zh"); overrides the saved preference.
    #[arg(long, env = "NIBOT_CHAT_LANG")]
    lang: Option<String>,
    /// Directory for the transcript, language preference, and log file.
    #[arg(long, env = "NIBOT_CHAT_STATE_DIR")]
    state_dir: Option<PathBuf>,
    /// Start with an empty transcript.
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let state_dir = args.state_dir.clone().unwrap_or_else(default_state_dir);
    if let Err(err) = std::fs::create_dir_all(&state_dir) {
        eprintln!("failed to create state dir {}: {}", state_dir.display(), err);
        std::process::exit(1);
    }

    // Log to a file; stdout belongs to the UI.
    let file_appender = tracing_appender::rolling::never(&state_dir, "nibot-chat.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(writer)
        .with_ansi(false)
        .compact()
        .init();

    let config = ChatConfig {
        server: args.server,
        backoff_base: DEFAULT_BACKOFF_BASE,
        backoff_cap: DEFAULT_BACKOFF_CAP,
        log_path: state_dir.join("transcript.json"),
        lang_path: state_dir.join("lang"),
    };

    if args.fresh {
        let _ = std::fs::remove_file(&config.log_path);
    }

    let locale = match args.lang.as_deref().and_then(Lang::from_token) {
        Some(lang) => Locale::new(lang, Some(config.lang_path.clone())),
        None => Locale::load(config.lang_path.clone()),
    };

    if let Err(err) = nibot_chat::ui::run_tui(config, locale).await {
        error!(error = %err, "chat client exited with error");
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
