use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use streamchat_core::{
    client::BackendClient,
    config::Config,
    dispatch::{CommandOutcome, CommandRegistry},
    event::StreamEvent,
    model::Mode,
    normalize::display_title,
    session::{ChatSession, ReplySink, SessionContext},
    transport::TurnTransport,
};

#[derive(Parser)]
#[command(author, version, about = "streamchat CLI smoke tool", long_about = None)]
struct Cli {
    /// Path to a JSON or TOML config file; defaults target a local backend.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored conversations
    Chats {
        #[arg(long, help = "Filter titles by this search term")]
        search: Option<String>,
    },
    /// Print the message history of one conversation
    History {
        #[arg(help = "Conversation id")]
        id: String,
    },
    /// Delete one conversation
    Delete {
        #[arg(help = "Conversation id")]
        id: String,
    },
    /// Delete every stored conversation
    Clear,
    /// Show or set the backend connectivity mode
    Mode {
        #[arg(long, help = "Set the mode to 'online' or 'offline'")]
        set: Option<String>,
    },
    /// Run a named UI action through the command dispatch table
    Do {
        #[arg(help = "Action name, e.g. new-chat, search, code")]
        action: String,
    },
    /// Send a message and stream the reply
    Send {
        #[arg(short, long, help = "Message from the user")]
        message: String,
        #[arg(long, help = "Existing conversation id (a new one is minted otherwise)")]
        conversation: Option<String>,
        #[arg(long, help = "Print raw deltas as they arrive instead of the rendered reply")]
        live: bool,
    },
}

/// Sink that keeps only the latest rendered snapshot; the final one is
/// printed once the stream ends.
#[derive(Default)]
struct LatestMarkup {
    markup: String,
}

impl ReplySink for LatestMarkup {
    fn replace_markup(&mut self, markup: &str) {
        self.markup = markup.to_string();
    }
    fn set_busy(&mut self, _busy: bool) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    streamchat_core::telemetry::set_telemetry_sink(std::sync::Arc::new(
        streamchat_core::telemetry::TracingSink,
    ));

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    let client = BackendClient::from_config(&cfg)?;

    match cli.command {
        Commands::Chats { search } => {
            let all = client.conversations().await?;
            let shown: Vec<_> = match &search {
                Some(term) => streamchat_core::client::filter_conversations(&all, term)
                    .into_iter()
                    .cloned()
                    .collect(),
                None => all,
            };
            if shown.is_empty() {
                println!("(no chats)");
            }
            for c in shown {
                println!("{} {}", c.id, display_title(&c.title));
            }
        }
        Commands::History { id } => {
            for entry in client.history(&id).await? {
                println!("[{:?}] {}", entry.role, entry.text);
            }
        }
        Commands::Delete { id } => {
            client.delete(&id).await?;
            println!("deleted {id}");
        }
        Commands::Clear => {
            let removed = client.clear_history().await?;
            println!("deleted {removed} conversation(s)");
        }
        Commands::Mode { set } => match set {
            Some(value) => {
                let mode = match value.as_str() {
                    "online" => Mode::Online,
                    "offline" => Mode::Offline,
                    other => anyhow::bail!("unknown mode '{other}' (use online|offline)"),
                };
                client.set_mode(mode).await?;
                println!("mode set to {}", mode.as_str());
            }
            None => {
                let mode = client.mode().await?;
                println!("{}", mode.as_str());
            }
        },
        Commands::Do { action } => {
            let registry = CommandRegistry::new();
            let mut ctx = SessionContext::new();
            match registry.dispatch(&action, &mut ctx) {
                Some(CommandOutcome::Reset) => println!(
                    "started conversation {}",
                    ctx.conversation_id().unwrap_or("?")
                ),
                Some(CommandOutcome::Search(on)) => {
                    println!("search mode {}", if on { "on" } else { "off" })
                }
                Some(CommandOutcome::Draft(text)) => println!("{text}"),
                Some(CommandOutcome::Notice(markup)) => println!("{markup}"),
                None => anyhow::bail!("unknown action '{action}'"),
            }
        }
        Commands::Send {
            message,
            conversation,
            live,
        } => {
            if live {
                // Raw delta view: print chunks as they arrive, no rendering.
                use std::io::{self, Write};
                let conversation_id = conversation.unwrap_or_else(|| {
                    // The live view bypasses the session, so mint an id the
                    // same way the session would.
                    SessionContext::new().ensure_conversation().to_string()
                });
                let mut stream = client.submit_turn(&message, &conversation_id).await?;
                let mut saw_delta = false;
                while let Some(ev) = stream.next().await {
                    match ev {
                        Ok(StreamEvent::TextDelta(txt)) => {
                            saw_delta = true;
                            print!("{}", txt);
                            io::stdout().flush().ok();
                        }
                        Ok(StreamEvent::Status(txt)) => {
                            eprintln!("[status: {txt}]");
                        }
                        Ok(StreamEvent::Done) => {
                            if saw_delta {
                                println!();
                            }
                            break;
                        }
                        Err(err) => {
                            eprintln!("[error: {err}]");
                            break;
                        }
                        _ => {}
                    }
                }
            } else {
                let mut session = ChatSession::new(client);
                if let Some(id) = conversation {
                    session.context_mut().open_conversation(&id);
                }
                let mut sink = LatestMarkup::default();
                match session.send(&message, &mut sink).await {
                    Ok(_text) => println!("{}", sink.markup),
                    Err(err) => {
                        eprintln!("send failed: {err}");
                        println!("{}", sink.markup);
                        std::process::exit(1);
                    }
                }
            }
        }
    }

    Ok(())
}
