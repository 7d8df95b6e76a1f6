use super::*;
use crate::completion::CompletionService;
use crate::config::OllamaConfig;
use crate::embeddings::Embedder;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn config_for(server: &MockServer) -> OllamaConfig {
    let url = Url::parse(&server.uri()).expect("mock server uri is a url");
    OllamaConfig {
        host: url.host_str().expect("mock server has a host").to_string(),
        port: url.port().expect("mock server has a port"),
        embedding_model: "test-embed".to_string(),
        generation_model: "test-chat".to_string(),
        temperature: 0.3,
        batch_size: 2,
        ..OllamaConfig::default()
    }
}

fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&config_for(server))
        .expect("client builds from valid config")
        .with_retry_delay(Duration::from_millis(10))
}

/// Returns one embedding per input so batching can be observed
struct EchoEmbeddings;

impl Respond for EchoEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().expect("request body is json");
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let embeddings: Vec<Vec<f32>> = inputs
            .iter()
            .map(|input| {
                let len = input.as_str().map_or(0, str::len);
                vec![len as f32, 1.0]
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "embed-model".to_string(),
        generation_model: "chat-model".to_string(),
        temperature: 0.7,
        batch_size: 128,
        timeout_seconds: 30,
        retry_attempts: 3,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model(), "embed-model");
    assert_eq!(client.generation_model(), "chat-model");
    assert_eq!(client.batch_size(), 128);
    assert_eq!(client.base_url().host_str(), Some("test-host"));
    assert_eq!(client.base_url().port(), Some(1234));
    assert_eq!(client.timeout, Duration::from_secs(30));
    assert_eq!(client.retry_attempts, 3);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(0)
        .with_retry_delay(Duration::ZERO);

    assert_eq!(client.timeout, Duration::from_secs(60));
    assert_eq!(client.retry_attempts, 1);
    assert_eq!(client.retry_delay, Duration::ZERO);
}

#[test]
fn transient_errors() {
    assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
    assert!(
        ServiceError::Transport {
            url: "http://localhost".to_string(),
            message: "refused".to_string(),
        }
        .is_transient()
    );
    assert!(ServiceError::Status(503).is_transient());
    assert!(!ServiceError::Status(404).is_transient());
    assert!(!ServiceError::InvalidResponse("bad json".to_string()).is_transient());
}

#[test]
fn model_name_matching() {
    assert!(model_matches("gemma3:1b", "gemma3:1b"));
    assert!(model_matches("nomic-embed-text:latest", "nomic-embed-text"));
    assert!(model_matches("nomic-embed-text", "nomic-embed-text:latest"));
    assert!(!model_matches("gemma3:4b", "gemma3:1b"));
    assert!(!model_matches("llama3:latest", "llama3.2"));
}

#[tokio::test]
async fn embed_sends_one_request_per_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": "test-embed" })))
        .respond_with(EchoEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
        .iter()
        .map(ToString::to_string)
        .collect();

    let embeddings = client.embed(&texts).await.expect("embedding succeeds");

    assert_eq!(embeddings.len(), 5);
    let lengths: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
    assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(Embedder::batch_size(&client), 2);
}

#[tokio::test]
async fn embed_nothing_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EchoEmbeddings)
        .expect(0)
        .mount(&server)
        .await;

    let embeddings = client_for(&server)
        .embed(&[])
        .await
        .expect("empty input is fine");
    assert!(embeddings.is_empty());
}

#[tokio::test]
async fn embed_count_mismatch_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2]] })),
        )
        .mount(&server)
        .await;

    let texts = vec!["one".to_string(), "two".to_string()];
    let result = client_for(&server).embed(&texts).await;

    assert!(matches!(result, Err(ServiceError::InvalidResponse(_))));
}

#[tokio::test]
async fn generate_sends_model_and_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "test-chat",
            "prompt": "Say hi",
            "stream": false,
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "response": "Hi there!", "done": true })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server)
        .complete("Say hi")
        .await
        .expect("completion succeeds");
    assert_eq!(reply, "Hi there!");

    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let body: Value = requests[0].body_json().expect("request body is json");
    let temperature = body["options"]["temperature"]
        .as_f64()
        .expect("temperature is sent");
    assert!((temperature - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "recovered" })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server)
        .complete("hello")
        .await
        .expect("second attempt succeeds");
    assert_eq!(reply, "recovered");
}

#[tokio::test]
async fn retries_stop_after_configured_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let result = client_for(&server).complete("hello").await;
    assert!(matches!(result, Err(ServiceError::Status(500))));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).complete("hello").await;
    assert!(matches!(result, Err(ServiceError::Status(404))));
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "too late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server)
        .with_timeout(Duration::from_millis(200))
        .with_retry_attempts(1);
    let result = client.complete("hello").await;

    assert!(matches!(result, Err(ServiceError::Timeout(_))));
}

#[tokio::test]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "test-embed:latest", "size": 274302450, "digest": "abc" },
                { "name": "other-model:7b" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let models = {
        let client = client.clone();
        tokio::task::spawn_blocking(move || client.list_models())
            .await
            .expect("task completes")
            .expect("models listed")
    };
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "test-embed:latest");

    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task completes");
    let message = health.expect_err("chat model is missing").to_string();
    assert!(message.contains("test-chat"), "unexpected message: {message}");
}

#[tokio::test]
async fn health_check_passes_with_models_installed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "test-embed:latest" },
                { "name": "test-chat:latest" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task completes");
    assert!(health.is_ok(), "health check failed: {health:?}");
}
