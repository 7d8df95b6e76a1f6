
use anyhow::{Context, Result};
use clap::ValueEnum;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::loader::{FileOutcome, FileStatus, UploadedFile};
use crate::ollama::OllamaClient;
use crate::session::{BuildReport, ChatMode, Reply, Session};

/// One line of input to the chat loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    Mode(ChatMode),
    Upload(Vec<PathBuf>),
    Clear,
    ResetDocuments,
    Stats,
    Help,
    Quit,
    Invalid(String),
    Empty,
}

impl ChatInput {
    /// Interpret a line typed at the chat prompt
    #[inline]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        let Some(command) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match (name, args.as_slice()) {
            ("quit" | "exit", []) => Self::Quit,
            ("help", []) => Self::Help,
            ("clear", []) => Self::Clear,
            ("reset-docs", []) => Self::ResetDocuments,
            ("stats", []) => Self::Stats,
            ("mode", [mode]) => ChatMode::from_str(mode, true).map_or_else(
                |_| Self::Invalid(format!("Unknown mode '{mode}', use 'normal' or 'docs'")),
                Self::Mode,
            ),
            ("mode", _) => Self::Invalid("Usage: /mode normal|docs".to_string()),
            ("upload", []) => Self::Invalid("Usage: /upload FILE...".to_string()),
            ("upload", files) => Self::Upload(files.iter().map(PathBuf::from).collect()),
            _ => Self::Invalid(format!("Unknown command '/{name}', type /help")),
        }
    }
}

/// Interactive chat loop on stdin
#[inline]
pub async fn chat(config: &Config, documents: &[PathBuf]) -> Result<()> {
    let mut session = Session::from_config(config)?;
    info!("Started chat session {}", session.id());

    println!("{}", style("🤖 Docs Chat").bold().cyan());
    println!(
        "Chatting with {} via {}. Type /help for commands.",
        style(&config.ollama.generation_model).cyan(),
        style(config.ollama_url()?).dim()
    );

    if !documents.is_empty() {
        upload(&mut session, documents).await;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("\n{} ", style(prompt_label(session.mode())).bold().green());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match ChatInput::parse(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Help => print_help(),
            ChatInput::Invalid(message) => println!("{}", style(message).yellow()),
            ChatInput::Mode(mode) => {
                session.set_mode(mode);
                println!("Switched to {}", style(mode).cyan());
                if mode == ChatMode::DocumentChat && !session.is_index_ready() {
                    println!(
                        "{}",
                        style("⚠️  No documents indexed yet, use /upload FILE...").yellow()
                    );
                }
            }
            ChatInput::Upload(paths) => upload(&mut session, &paths).await,
            ChatInput::Clear => {
                session.reset_chat();
                println!("🗑️  Chat history cleared");
            }
            ChatInput::ResetDocuments => {
                session.reset_index();
                println!("🗑️  Documents cleared");
            }
            ChatInput::Stats => {
                let stats = session.stats();
                println!("📊 Chat Stats");
                println!("   Mode: {}", session.mode());
                println!("   Messages: {}", stats.message_count);
                println!("   Questions: {}", stats.question_count);
                match session.index() {
                    Some(index) => println!(
                        "   Documents: {} ({} chunks)",
                        index.sources().join(", "),
                        index.len()
                    ),
                    None => println!("   Documents: none"),
                }
            }
            ChatInput::Message(text) => {
                let reply = session.send_message(&text).await;
                print_reply(&reply);
            }
        }
    }

    println!("👋 Goodbye!");
    Ok(())
}

/// Answer a single question, from the documents when any are given
#[inline]
pub async fn ask(config: &Config, documents: &[PathBuf], question: &str) -> Result<()> {
    let mut session = Session::from_config(config)?;

    if !documents.is_empty() {
        let files = read_files(documents);
        let report = index_with_spinner(&mut session, &files)
            .await
            .inspect_err(|e| print_outcomes(e.file_outcomes()))
            .context("Failed to process documents")?;
        print_report(&report);
        session.set_mode(ChatMode::DocumentChat);
    }

    let reply = session.send_message(question).await;
    print_reply(&reply);

    match reply {
        Reply::Answer { .. } => Ok(()),
        Reply::Refused(text) | Reply::Failed(text) => Err(anyhow::anyhow!(text)),
    }
}

/// Verify the Ollama server is reachable and has both models installed
#[inline]
pub async fn check(config: &Config) -> Result<()> {
    println!("🤖 Ollama Status:");

    let client = OllamaClient::new(&config.ollama)?;
    let url = client.base_url().clone();
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task failed")?;

    match result {
        Ok(()) => {
            println!("   ✅ Ollama: Connected ({url})");
            println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
            println!("   💬 Chat Model: {}", config.ollama.generation_model);
            Ok(())
        }
        Err(e) => {
            println!("   ❌ Ollama: {e}");
            println!(
                "   Make sure Ollama is running and run `ollama pull {}` and `ollama pull {}`",
                config.ollama.embedding_model, config.ollama.generation_model
            );
            Err(e)
        }
    }
}

async fn upload(session: &mut Session, paths: &[PathBuf]) {
    let files = read_files(paths);
    if files.is_empty() {
        println!("{}", style("No files could be read").yellow());
        return;
    }

    match index_with_spinner(session, &files).await {
        Ok(report) => {
            print_report(&report);
            session.set_mode(ChatMode::DocumentChat);
            println!("Switched to {}", style(ChatMode::DocumentChat).cyan());
        }
        Err(e) => {
            println!("{} {}", style("❌ Error processing documents:").red(), e);
            print_outcomes(e.file_outcomes());
        }
    }
}

fn read_files(paths: &[PathBuf]) -> Vec<UploadedFile> {
    paths
        .iter()
        .filter_map(|path| match UploadedFile::from_path(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                println!("   ❌ {}: {}", display_name(path), e);
                None
            }
        })
        .collect()
}

async fn index_with_spinner(
    session: &mut Session,
    files: &[UploadedFile],
) -> crate::Result<BuildReport> {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("{} file(s)", files.len()));
    bar.set_position(0);
    bar.set_length(1);

    let progress_bar = bar.clone();
    let result = session
        .upload_and_index_with_progress(files, &mut move |done, total| {
            progress_bar.set_length(total as u64);
            progress_bar.set_position(done as u64);
        })
        .await;

    bar.finish_and_clear();
    result
}

fn print_report(report: &BuildReport) {
    println!(
        "✅ Indexed {} chunks from {} of {} file(s)",
        report.chunk_count,
        report.loaded_count(),
        report.files.len()
    );
    print_outcomes(&report.files);
}

fn print_outcomes(files: &[FileOutcome]) {
    for file in files {
        match &file.status {
            FileStatus::Loaded { characters } => {
                println!("   📄 {} ({} characters)", file.file_name, characters);
            }
            FileStatus::Skipped { reason } => {
                println!("   ⏭️  {} skipped: {}", file.file_name, reason);
            }
            FileStatus::Failed { error } => {
                println!("   ❌ {} failed: {}", file.file_name, error);
            }
        }
    }
}

fn print_reply(reply: &Reply) {
    match reply {
        Reply::Answer { text, sources } => {
            println!("\n{}", text);
            if !sources.is_empty() {
                let cited = sources
                    .iter()
                    .map(|hit| format!("{}#{}", hit.chunk.source, hit.chunk.chunk_index + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{}", style(format!("Sources: {cited}")).dim());
            }
        }
        Reply::Refused(text) => println!("{}", style(format!("⚠️  {text}")).yellow()),
        Reply::Failed(text) => println!("{}", style(format!("❌ {text}")).red()),
    }
}

fn print_help() {
    println!("Type a message to chat. Commands:");
    println!("   /mode normal|docs   switch between normal and document chat");
    println!("   /upload FILE...     index PDF, DOCX or TXT files and switch to docs mode");
    println!("   /clear              clear the chat history");
    println!("   /reset-docs         forget the indexed documents");
    println!("   /stats              show chat statistics");
    println!("   /quit               leave the chat");
}

const fn prompt_label(mode: ChatMode) -> &'static str {
    match mode {
        ChatMode::NormalChat => "You ›",
        ChatMode::DocumentChat => "You (docs) ›",
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
