// Chat session
// Owns the conversation, the active mode and the document index for one user


use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::completion::CompletionService;
use crate::config::{Config, RetrievalConfig};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_documents};
use crate::index::{SearchHit, VectorIndex};
use crate::loader::{FileOutcome, UploadedFile, load_documents};
use crate::ollama::OllamaClient;
use crate::{ChatError, Result, prompt};

/// How questions are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
pub enum ChatMode {
    /// Free-form conversation with the model
    #[default]
    #[value(name = "normal")]
    NormalChat,
    /// Answers grounded in the uploaded documents
    #[value(name = "docs", alias = "documents")]
    DocumentChat,
}

impl fmt::Display for ChatMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NormalChat => write!(f, "Normal chat"),
            Self::DocumentChat => write!(f, "Document chat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    #[inline]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    #[inline]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Outcome of a single user turn
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The model answered; `sources` holds the retrieved chunks in document mode
    Answer {
        text: String,
        sources: Vec<SearchHit>,
    },
    /// Document mode without an index; nothing was recorded
    Refused(String),
    /// A service call failed; the error text was recorded as the reply
    Failed(String),
}

impl Reply {
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            Self::Answer { text, .. } | Self::Refused(text) | Self::Failed(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChatStats {
    pub message_count: usize,
    /// User-role messages
    pub question_count: usize,
}

/// Result of processing an upload batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub files: Vec<FileOutcome>,
    pub chunk_count: usize,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
}

impl BuildReport {
    #[inline]
    pub fn loaded_count(&self) -> usize {
        self.files.iter().filter(|file| file.is_loaded()).count()
    }
}

pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    mode: ChatMode,
    messages: Vec<ChatMessage>,
    index: Option<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionService>,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
}

impl fmt::Debug for Session {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("messages", &self.messages.len())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Session {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionService>,
        config: &Config,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Starting chat session {}", id);

        Self {
            id,
            started_at: Utc::now(),
            mode: ChatMode::default(),
            messages: Vec::new(),
            index: None,
            embedder,
            completion,
            chunking: config.chunking,
            retrieval: config.retrieval,
        }
    }

    /// Session backed by the Ollama server described in `config`
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(&config.ollama)?);
        let embedder: Arc<dyn Embedder> = Arc::clone(&client) as Arc<dyn Embedder>;
        Ok(Self::new(embedder, client, config))
    }

    /// Answer one user message according to the current mode
    ///
    /// Never fails: service errors become a recorded [`Reply::Failed`].
    #[inline]
    pub async fn send_message(&mut self, text: &str) -> Reply {
        let (prompt, sources) = match self.mode {
            ChatMode::NormalChat => (
                prompt::assemble_chat(text, &self.messages, self.retrieval.history_messages),
                Vec::new(),
            ),
            ChatMode::DocumentChat => {
                let Some(index) = &self.index else {
                    warn!("Document question asked before any documents were indexed");
                    return Reply::Refused(ChatError::IndexNotReady.to_string());
                };

                match index.search(text, self.retrieval.top_k).await {
                    Ok(hits) => {
                        let chunks: Vec<_> = hits.iter().map(|hit| hit.chunk.clone()).collect();
                        let prompt = prompt::assemble(
                            text,
                            &chunks,
                            &self.messages,
                            self.retrieval.history_messages,
                        );
                        (prompt, hits)
                    }
                    Err(e) => return self.record_failure(text, &e),
                }
            }
        };

        match self.completion.complete(&prompt).await {
            Ok(answer) => {
                self.messages.push(ChatMessage::user(text));
                self.messages.push(ChatMessage::assistant(answer.clone()));
                Reply::Answer {
                    text: answer,
                    sources,
                }
            }
            Err(e) => self.record_failure(text, &ChatError::Completion(e.to_string())),
        }
    }

    fn record_failure(&mut self, text: &str, error: &ChatError) -> Reply {
        warn!("Failed to answer message: {}", error);
        let reply = format!("Sorry, I encountered an error: {error}");
        self.messages.push(ChatMessage::user(text));
        self.messages.push(ChatMessage::assistant(reply.clone()));
        Reply::Failed(reply)
    }

    /// Replace the index with one built from `files`
    ///
    /// On error the previous index, if any, stays in place and the returned
    /// [`ChatError::Build`] lists what happened to each file.
    #[inline]
    pub async fn upload_and_index(&mut self, files: &[UploadedFile]) -> Result<BuildReport> {
        self.upload_and_index_with_progress(files, &mut |_, _| {})
            .await
    }

    /// Same as [`Session::upload_and_index`], reporting `(embedded, total)` chunks
    #[inline]
    pub async fn upload_and_index_with_progress(
        &mut self,
        files: &[UploadedFile],
        progress: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<BuildReport> {
        let (documents, outcomes) = load_documents(files);
        let chunks = chunk_documents(&documents, &self.chunking);
        info!(
            "Indexing {} chunks from {} documents",
            chunks.len(),
            documents.len()
        );

        let index =
            match VectorIndex::build_with_progress(chunks, Arc::clone(&self.embedder), progress)
                .await
            {
                Ok(index) => index,
                Err(e) => {
                    warn!("Failed to index {} uploaded files: {}", files.len(), e);
                    return Err(ChatError::Build {
                        files: outcomes,
                        source: Box::new(e),
                    });
                }
            };

        let report = BuildReport {
            files: outcomes,
            chunk_count: index.len(),
            dimension: index.dimension(),
            built_at: index.built_at(),
        };

        if self.index.replace(index).is_some() {
            debug!("Replaced the previous document index");
        }

        Ok(report)
    }

    /// Retrieve the chunks most similar to `query`
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        match &self.index {
            Some(index) => index.search(query, k).await,
            None => Err(ChatError::IndexNotReady),
        }
    }

    /// Forget the conversation, keeping the index
    #[inline]
    pub fn reset_chat(&mut self) {
        self.messages.clear();
    }

    /// Drop the index, keeping the conversation
    #[inline]
    pub fn reset_index(&mut self) {
        self.index = None;
    }

    #[inline]
    pub fn stats(&self) -> ChatStats {
        ChatStats {
            message_count: self.messages.len(),
            question_count: self
                .messages
                .iter()
                .filter(|message| message.role == Role::User)
                .count(),
        }
    }

    #[inline]
    pub fn set_mode(&mut self, mode: ChatMode) {
        debug!("Switching to {}", mode);
        self.mode = mode;
    }

    #[inline]
    pub const fn mode(&self) -> ChatMode {
        self.mode
    }

    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[inline]
    pub const fn is_index_ready(&self) -> bool {
        self.index.is_some()
    }

    #[inline]
    pub const fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    #[inline]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
