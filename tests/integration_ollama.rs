#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use docs_chat::completion::CompletionService;
use docs_chat::config::{Config, OllamaConfig};
use docs_chat::embeddings::Embedder;
use docs_chat::loader::UploadedFile;
use docs_chat::ollama::OllamaClient;
use docs_chat::session::{ChatMode, Reply, Session};
use serial_test::serial;
use std::env;
use std::time::Duration;
use tracing::info;

const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn integration_test_config() -> Config {
    let defaults = OllamaConfig::default();
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let embedding_model =
        env::var("OLLAMA_EMBEDDING_MODEL").unwrap_or_else(|_| defaults.embedding_model.clone());
    let generation_model =
        env::var("OLLAMA_MODEL").unwrap_or_else(|_| defaults.generation_model.clone());

    Config {
        ollama: OllamaConfig {
            host,
            port,
            embedding_model,
            generation_model,
            batch_size: 5,
            ..defaults
        },
        ..Config::default()
    }
}

fn create_integration_test_client() -> OllamaClient {
    OllamaClient::new(&integration_test_config().ollama)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(120))
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("health check task completes");

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_batch_embeddings() {
    init_test_tracing();

    let client = create_integration_test_client();
    let texts: Vec<String> = (0..12)
        .map(|i| format!("Test document number {i} about a different topic."))
        .collect();

    let embeddings = client.embed(&texts).await.expect("embeddings are generated");

    assert_eq!(embeddings.len(), texts.len());
    let dimension = embeddings[0].len();
    assert!(dimension > 0);
    assert!(embeddings.iter().all(|e| e.len() == dimension));
    info!("Generated {} embeddings of dimension {}", embeddings.len(), dimension);
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_completion() {
    init_test_tracing();

    let client = create_integration_test_client();
    let reply = client
        .complete("Reply with the single word: pong")
        .await
        .expect("completion succeeds");

    assert!(!reply.trim().is_empty());
    info!("Model replied: {}", reply);
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_document_chat() {
    init_test_tracing();

    let mut session =
        Session::from_config(&integration_test_config()).expect("session is created");
    let notes = "The project codename is Bluebird. \
        The launch is planned for the third week of March. \
        The budget owner is the finance team.";

    let report = session
        .upload_and_index(&[UploadedFile::new("project.txt", notes.as_bytes().to_vec())])
        .await
        .expect("documents are indexed");
    assert_eq!(report.chunk_count, 1);

    session.set_mode(ChatMode::DocumentChat);
    let reply = session.send_message("What is the project codename?").await;

    assert!(matches!(reply, Reply::Answer { .. }), "unexpected reply {reply:?}");
    assert_eq!(session.stats().question_count, 1);
    info!("Model replied: {}", reply.text());
}
