// Prompt assembly
// Pure functions turning retrieved chunks, recent history and a question into
// a single completion prompt


use itertools::Itertools;

use crate::embeddings::Chunk;
use crate::session::{ChatMessage, Role};

/// Phrase the model is asked to use when the documents lack an answer
pub const NOT_FOUND_PHRASE: &str = "not found in documents";

const DOCUMENT_PREAMBLE: &str =
    "You are a helpful AI assistant that answers questions based on the provided documents.";

const CHAT_PREAMBLE: &str = "You are a helpful AI assistant. \
    Answer clearly in simple language. \
    Use bullet points when listing multiple items.";

const CHAT_MEMORY_INSTRUCTION: &str =
    "Be conversational and remember the context of previous messages.";

/// Build the document question prompt
///
/// Chunks appear in the order given, separated by a blank line. At most
/// `history_messages` of the latest messages are included, oldest first.
#[inline]
pub fn assemble(
    question: &str,
    chunks: &[Chunk],
    history: &[ChatMessage],
    history_messages: usize,
) -> String {
    let context = chunks.iter().map(|chunk| chunk.text.as_str()).join("\n\n");
    let instruction = format!(
        "Please answer based on the context provided. \
         If the answer is not in the documents, say clearly that it was {NOT_FOUND_PHRASE}."
    );

    match render_history(history, history_messages) {
        Some(history_text) => format!(
            "{DOCUMENT_PREAMBLE}\n\n\
             Context from documents:\n{context}\n\n\
             Previous conversation:\n{history_text}\n\n\
             Current question: {question}\n\n\
             {instruction}"
        ),
        None => format!(
            "{DOCUMENT_PREAMBLE}\n\n\
             Context from documents:\n{context}\n\n\
             Question: {question}\n\n\
             {instruction}"
        ),
    }
}

/// Build the free-form chat prompt
#[inline]
pub fn assemble_chat(question: &str, history: &[ChatMessage], history_messages: usize) -> String {
    match render_history(history, history_messages) {
        Some(history_text) => format!(
            "{CHAT_PREAMBLE} {CHAT_MEMORY_INSTRUCTION}\n\n\
             Previous conversation:\n{history_text}\n\n\
             Current question: {question}"
        ),
        None => format!("{CHAT_PREAMBLE}\n\n{question}"),
    }
}

/// The last `count` messages, oldest first
#[inline]
pub fn recent_history(history: &[ChatMessage], count: usize) -> &[ChatMessage] {
    history
        .get(history.len().saturating_sub(count)..)
        .unwrap_or_default()
}

fn render_history(history: &[ChatMessage], count: usize) -> Option<String> {
    let recent = recent_history(history, count);
    if recent.is_empty() {
        return None;
    }

    Some(
        recent
            .iter()
            .map(|message| {
                let speaker = match message.role {
                    Role::User => "Human",
                    Role::Assistant => "Assistant",
                };
                format!("{speaker}: {}", message.text)
            })
            .join("\n"),
    )
}
