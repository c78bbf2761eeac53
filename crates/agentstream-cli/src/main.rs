//! agentstream: chat with an agent backend from the terminal.
//!
//! Replies are printed as they stream in. Conversations are kept in a JSON
//! history file (`~/.agentstream/history.json` by default) so a chat can be
//! continued with `--chat-id`.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use agentstream_core::config::TransportPreference;
use agentstream_core::{
    AgentChat, AgentEndpoint, AgentUpdate, ClientConfig, ImageAttachment, Role, SessionId,
    TurnOutcome, TurnRequest,
};

#[derive(Parser)]
#[command(name = "agentstream")]
#[command(about = "Streaming chat client for agent backends", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (e.g. http://localhost:8123/api)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Auth token sent with every request
    #[arg(long, global = true)]
    token: Option<String>,

    /// History file
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    /// Directory for per-turn wire transcripts
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply
    Send {
        /// Agent to talk to (inspector, manus)
        #[arg(long, default_value = "inspector")]
        agent: String,

        /// Continue an existing chat
        #[arg(long)]
        chat_id: Option<String>,

        /// Attach an image
        #[arg(long)]
        image: Option<PathBuf>,

        /// Use chunked fetch even without an image
        #[arg(long)]
        chunked: bool,

        /// Print payloads as received, without interpreting structured updates
        #[arg(long)]
        raw: bool,

        message: String,
    },
    /// Print the messages of a chat
    History {
        #[arg(long, default_value = "inspector")]
        agent: String,
        chat_id: String,
    },
    /// List saved chats
    List {
        /// Only this agent
        #[arg(long)]
        agent: Option<String>,
    },
    /// Delete a saved chat
    Delete {
        #[arg(long, default_value = "inspector")]
        agent: String,
        chat_id: String,
    },
    /// Print a fresh chat id
    NewId,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = match cli.config {
        Some(ref path) => {
            log::debug!("loading config from {}", path.display());
            ClientConfig::load(path)?
        }
        None => ClientConfig::default(),
    };
    config.apply_env();
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    if cli.token.is_some() {
        config.auth_token = cli.token;
    }
    if cli.history.is_some() {
        config.history_path = cli.history;
    }
    if cli.log_dir.is_some() {
        config.log_dir = cli.log_dir;
    }

    match cli.command {
        Commands::Send {
            agent,
            chat_id,
            image,
            chunked,
            raw,
            message,
        } => {
            if chunked {
                config.transport = TransportPreference::Chunked;
            }
            let endpoint = find_agent(&agent)?;
            let mut request = TurnRequest::new(endpoint, message);
            if let Some(id) = chat_id {
                request = request.chat_id(id);
            }
            if let Some(ref path) = image {
                request = request.image(ImageAttachment::from_path(path)?);
            }

            let mut chat = AgentChat::from_config(&config);
            restore(&mut chat)?;
            send(&mut chat, request, raw)
        }
        Commands::History { agent, chat_id } => {
            let mut chat = AgentChat::from_config(&config);
            restore(&mut chat)?;
            let messages = chat.history(&agent, &SessionId::from(chat_id));
            if messages.is_empty() {
                eprintln!("(no messages)");
            }
            for message in messages {
                let who = match message.role {
                    Role::User => "you",
                    Role::Assistant => agent.as_str(),
                };
                println!(
                    "[{}] {}: {}",
                    message.created_at.format("%Y-%m-%d %H:%M:%S"),
                    who,
                    message.content
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { agent } => {
            let mut chat = AgentChat::from_config(&config);
            restore(&mut chat)?;
            let names: Vec<String> = match agent {
                Some(name) => vec![name],
                None => chat.agents().map(str::to_string).collect(),
            };
            for name in names {
                let Some(store) = chat.conversations(&name) else {
                    continue;
                };
                for id in store.session_ids() {
                    println!("{}\t{}\t{} messages", name, id, store.messages(id).len());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Delete { agent, chat_id } => {
            let mut chat = AgentChat::from_config(&config);
            restore(&mut chat)?;
            if chat.delete_chat(&agent, &SessionId::from(chat_id.as_str())) {
                println!("deleted {chat_id}");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("no chat {chat_id} for {agent}");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::NewId => {
            println!("{}", SessionId::new());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn find_agent(name: &str) -> Result<AgentEndpoint, String> {
    AgentEndpoint::by_name(name).ok_or_else(|| {
        let known: Vec<String> = AgentEndpoint::presets().into_iter().map(|a| a.name).collect();
        format!("unknown agent '{}' (known: {})", name, known.join(", "))
    })
}

fn restore(chat: &mut AgentChat) -> Result<(), Box<dyn std::error::Error>> {
    if chat.restore()? {
        log::debug!("restored saved chats");
    } else {
        log::debug!("no saved chats yet");
    }
    Ok(())
}

/// Line printed for a structured update, or `None` for plain text.
fn status_line(update: &AgentUpdate) -> Option<String> {
    match update {
        AgentUpdate::Text(_) => None,
        AgentUpdate::Structured(structured) => Some(format!(
            "[{}] {}",
            structured.kind.label(),
            update.display_text()
        )),
    }
}

fn send(
    chat: &mut AgentChat,
    request: TurnRequest,
    raw: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    let summary = chat.run_turn(request, |payload| {
        if raw {
            print!("{payload}");
        } else {
            let update = AgentUpdate::parse(payload);
            match status_line(&update) {
                Some(line) => println!("{line}"),
                None => print!("{}", update.display_text()),
            }
            if update.is_final() {
                log::debug!("agent reported its final update");
            }
        }
        let _ = stdout.flush();
    });
    println!();

    eprintln!("chat id: {}", summary.session_id);
    log::info!(
        "turn {} ended: {:?} ({} bytes)",
        summary.session_id,
        summary.outcome,
        summary.content.len()
    );
    match summary.outcome {
        TurnOutcome::Completed => Ok(ExitCode::SUCCESS),
        TurnOutcome::Cancelled => {
            eprintln!("cancelled");
            Ok(ExitCode::FAILURE)
        }
        TurnOutcome::Failed(e) => Err(e.into()),
    }
}
