//! Casalink Client - terminal chat
//!
//! Joins one conversation, prints inbound events and sends each stdin line
//! as a text message.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use casalink_client::auth::StoredSession;
use casalink_client::{
    ApiClient, Callbacks, ChatSession, ClientConfig, ConversationStore, FileTokenStore,
    SessionBuilder, StaticToken,
};
use casalink_shared::ChatMessage;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "casalink-chat", version, about = "Chat in a Casalink property conversation")]
struct Cli {
    /// Conversation to join
    conversation_id: String,

    /// Backend access token (falls back to the saved session file)
    #[arg(long, env = "CASALINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print the conversation history before going live
    #[arg(long)]
    history: bool,

    /// Save --token to the session file for later runs
    #[arg(long, requires = "token")]
    remember: bool,
}

type Shared = Arc<Mutex<ConversationStore>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("casalink_client=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let session_file = FileTokenStore::default_location();

    if cli.remember {
        if let (Some(file), Some(token)) = (&session_file, &cli.token) {
            file.save(&StoredSession {
                access_token: token.clone(),
                user_id: None,
            })
            .with_context(|| format!("failed to write {}", file.path().display()))?;
            tracing::info!(path = %file.path().display(), "session saved");
        }
    }

    let store: Shared = Arc::new(Mutex::new(ConversationStore::default()));

    let builder = match (cli.token.clone(), session_file) {
        (Some(token), _) => {
            SessionBuilder::new(&cli.conversation_id, config.ws_base.clone(), StaticToken::new(token))
        }
        (None, Some(file)) if file.load().is_some() => {
            SessionBuilder::new(&cli.conversation_id, config.ws_base.clone(), file)
        }
        _ => bail!("no access token: pass --token or set CASALINK_TOKEN"),
    };

    if cli.history {
        let token = cli
            .token
            .clone()
            .or_else(|| FileTokenStore::default_location()?.load().map(|s| s.access_token));
        if let Some(token) = token {
            print_history(&config, &cli.conversation_id, &token, &store).await;
        }
    }

    let session = builder
        .reconnect(config.reconnect.clone())
        .callbacks(printing_callbacks(store.clone()))
        .start();

    println!("joined {} (type /quit to leave)", cli.conversation_id);
    run_prompt(&session).await?;

    session.stop().await;
    Ok(())
}

async fn print_history(config: &ClientConfig, conversation_id: &str, token: &str, store: &Shared) {
    let api = ApiClient::new(config.api_base.clone());
    match api.conversation_messages(conversation_id, token).await {
        Ok(history) => {
            let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
            store.set_history(history);
            for msg in store.messages() {
                println!("{}", render(msg));
            }
        }
        Err(e) => tracing::warn!(error = %e, "could not load history"),
    }
}

fn render(msg: &ChatMessage) -> String {
    let sender = msg.sender_id.as_deref().unwrap_or("?");
    match msg.created_at {
        Some(ts) => format!("[{}] {sender}: {}", ts.format("%H:%M"), msg.content),
        None => format!("{sender}: {}", msg.content),
    }
}

fn printing_callbacks(store: Shared) -> Callbacks {
    let messages = store.clone();
    let typing = store.clone();
    let presence = store;

    Callbacks::new()
        .on_message(move |msg| {
            let line = render(&msg);
            let mut store = messages.lock().unwrap_or_else(PoisonError::into_inner);
            if store.add_message(msg) {
                println!("{line}");
            }
        })
        .on_typing(move |user| {
            let now = Instant::now();
            let mut store = typing.lock().unwrap_or_else(PoisonError::into_inner);
            let already = store.typing_users(now).contains(&user.as_str());
            store.mark_typing(user.clone(), now);
            if !already {
                println!("  {user} is typing...");
            }
        })
        .on_presence(move |user, online| {
            let mut store = presence.lock().unwrap_or_else(PoisonError::into_inner);
            store.set_presence(user.clone(), online);
            println!("  {user} is {}", if online { "online" } else { "offline" });
        })
        .on_error(|err| eprintln!("! {err}"))
}

async fn run_prompt(session: &ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else { break };
        let line = line.trim();

        match line {
            "" => {}
            "/quit" => break,
            "/typing" => session.send_typing(),
            "/reconnect" => session.reconnect()?,
            "/status" => {
                let status = session.status();
                println!("  {:?} (retries: {})", status.state, status.retries);
            }
            text => {
                if let Err(e) = session.send_text(text) {
                    eprintln!("! {e}");
                }
            }
        }
    }

    Ok(())
}
