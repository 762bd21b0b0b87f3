//! CLI binary for docuchat.
//!
//! A thin shim over the library crate that maps subcommands to engine
//! operations and prints results. State lives under the configured data
//! directory, so successive invocations see the same documents and
//! conversations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docuchat::{DocEngine, DocumentState, EngineConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "docuchat", version, about = "Chat with your documents, locally")]
struct Cli {
    /// Data directory (overrides DOCUCHAT_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Acting user id
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a document
    Upload {
        /// Path to a PDF, PNG, JPEG or TIFF file
        file: PathBuf,
        /// Declared media type; inferred from the extension when omitted
        #[arg(long)]
        media_type: Option<String>,
    },
    /// Extract text from an uploaded document
    Process {
        id: Uuid,
        /// OCR language code, e.g. eng, deu
        #[arg(long)]
        language: Option<String>,
    },
    /// List uploaded documents
    Docs,
    /// Show a document's extracted text
    Show { id: Uuid },
    /// Delete a document
    RemoveDoc { id: Uuid },
    /// Start a conversation and ask a single question
    Ask {
        /// Document id to ground the answer in
        document: Uuid,
        /// The question
        question: String,
    },
    /// Send a message in an existing conversation
    Chat {
        conversation: Uuid,
        message: String,
    },
    /// List conversations
    Conversations,
    /// Delete a conversation
    RemoveChat { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("docuchat=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let engine = DocEngine::with_ollama(config).context("failed to open engine")?;
    let user = cli.user.as_str();

    match cli.command {
        Command::Upload { file, media_type } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let mime = media_type
                .or_else(|| infer_mime(&file).map(str::to_string))
                .context("cannot infer media type; pass --media-type")?;
            let doc = engine.upload_document(user, &name, &mime, &bytes)?;
            println!("uploaded {} ({} bytes) as {}", doc.file_name, doc.file_size, doc.id);
        }
        Command::Process { id, language } => {
            let doc = engine
                .process_document(user, id, language.as_deref())
                .await?;
            match doc.state {
                DocumentState::Processed => {
                    let chars = doc.extracted_text.as_deref().map_or(0, str::len);
                    println!("processed {} ({chars} chars extracted)", doc.id);
                }
                state => println!("document {} is {}", doc.id, state.as_str()),
            }
        }
        Command::Docs => {
            for doc in engine.list_documents(user)? {
                println!(
                    "{}  {:<12} {:>9}  {}",
                    doc.id,
                    doc.state.as_str(),
                    doc.file_size,
                    doc.file_name
                );
            }
        }
        Command::Show { id } => {
            let doc = engine.get_document(user, id)?;
            match doc.extracted_text {
                Some(text) => println!("{text}"),
                None => println!("(no extracted text — state: {})", doc.state.as_str()),
            }
        }
        Command::RemoveDoc { id } => {
            engine.delete_document(user, id)?;
            println!("deleted document {id}");
        }
        Command::Ask { document, question } => {
            let conv = engine.create_conversation(user, document)?;
            print_turn(engine.send_message(user, conv.id, &question).await?);
            println!("(conversation {} — continue with `docuchat chat`)", conv.id);
        }
        Command::Chat { conversation, message } => {
            print_turn(engine.send_message(user, conversation, &message).await?);
        }
        Command::Conversations => {
            for summary in engine.list_conversations(user)? {
                let preview = summary
                    .last_message
                    .map(|m| m.content.chars().take(60).collect::<String>())
                    .unwrap_or_else(|| "(empty)".to_string());
                println!(
                    "{}  {}  {}",
                    summary.conversation.id, summary.document_file_name, preview
                );
            }
        }
        Command::RemoveChat { id } => {
            engine.delete_conversation(user, id)?;
            println!("deleted conversation {id}");
        }
    }

    Ok(())
}

fn print_turn(outcome: docuchat::SendMessageOutcome) {
    match outcome.assistant_message {
        Some(reply) => println!("{}", reply.content),
        None => eprintln!(
            "no reply: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

fn infer_mime(path: &std::path::Path) -> Option<&'static str> {
    match path
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase()
        .as_str()
    {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}
