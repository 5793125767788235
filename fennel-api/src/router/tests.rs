#[cfg(test)]
mod tests {
    use crate::app::{create_app, AppState};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use fennel_core::channel::ChannelType;
    use fennel_core::client::mock::{MockAdapterFactory, MockBehavior};
    use fennel_core::client::{OperationKind, RelayOperation, RequestBody};
    use fennel_core::config::model::{ChannelConfig, Config};
    use fennel_core::store::MemoryChannelStore;
    use fennel_relay::TracingLogSink;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.channels.insert(
            "main".to_string(),
            ChannelConfig {
                name: "Main".to_string(),
                channel_type: ChannelType::OpenAI,
                base_url: "https://api.test.com".to_string(),
                api_key: "sk-main".to_string(),
                models: vec!["gpt-4-canary".to_string(), "whisper-1".to_string()],
                enabled: true,
            },
        );
        config
            .model_mapping
            .insert("gpt-4".to_string(), vec!["gpt-4-canary".to_string()]);
        config.settings.health_check.enabled = false;
        config
    }

    async fn create_test_server(adapters: MockAdapterFactory) -> TestServer {
        let state = AppState::with_components(
            create_test_config(),
            Arc::new(MemoryChannelStore::new()),
            Arc::new(adapters),
            Arc::new(TracingLogSink),
            None,
        )
        .await
        .unwrap();
        TestServer::new(create_app(state)).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let server = create_test_server(MockAdapterFactory::new()).await;

        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["channels"]["total"], 1);
        assert_eq!(body["scheduler"], "idle");
        assert_eq!(body["database"], "not_configured");
    }

    #[tokio::test]
    async fn test_models_lists_aliases_and_served_keys() {
        let server = create_test_server(MockAdapterFactory::new()).await;

        let response = server.get("/v1/models").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["object"], "list");
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["gpt-4", "gpt-4-canary", "whisper-1"]);
    }

    #[tokio::test]
    async fn test_chat_completion_streams_upstream_body() {
        let adapters = MockAdapterFactory::new();
        adapters.set_default(1, MockBehavior::ok(r#"{"id":"chatcmpl-1","choices":[]}"#));
        let server = create_test_server(adapters.clone()).await;

        let response = server
            .post("/v1/chat/completions")
            .json(&json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hello"}]
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.text(), r#"{"id":"chatcmpl-1","choices":[]}"#);
        assert_eq!(
            response.header("content-type").to_str().unwrap(),
            "application/json"
        );

        let calls = adapters.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, OperationKind::ChatCompletion);
        assert_eq!(calls[0].model.as_deref(), Some("gpt-4-canary"));
        assert!(matches!(
            calls[0].operation,
            RelayOperation::ChatCompletion(RequestBody::Raw(_))
        ));
    }

    #[tokio::test]
    async fn test_exhausted_relay_returns_generic_503() {
        let adapters = MockAdapterFactory::new();
        adapters.set_default(1, MockBehavior::Fail(500));
        let server = create_test_server(adapters.clone()).await;

        let response = server
            .post("/v1/embeddings")
            .json(&json!({"model": "gpt-4-canary", "input": "hello"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(
            body["error"]["message"],
            "no provider available, try again later"
        );
        assert_eq!(adapters.call_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_model_is_bad_request() {
        let adapters = MockAdapterFactory::new();
        let server = create_test_server(adapters.clone()).await;

        let response = server
            .post("/v1/chat/completions")
            .json(&json!({"messages": []}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let response = server
            .post("/v1/chat/completions")
            .text("not json")
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(adapters.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_is_unavailable() {
        let adapters = MockAdapterFactory::new();
        let server = create_test_server(adapters.clone()).await;

        let response = server
            .post("/v1/completions")
            .json(&json!({"model": "claude-3", "prompt": "hi"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(adapters.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transcription_multipart_is_relayed() {
        let adapters = MockAdapterFactory::new();
        adapters.set_default(1, MockBehavior::ok(r#"{"text":"hello"}"#));
        let server = create_test_server(adapters.clone()).await;

        let form = MultipartForm::new()
            .add_text("model", "whisper-1")
            .add_text("language", "en")
            .add_part(
                "file",
                Part::bytes(b"RIFF....".to_vec())
                    .file_name("clip.wav")
                    .mime_type("audio/wav"),
            );
        let response = server
            .post("/v1/audio/transcriptions")
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.text(), r#"{"text":"hello"}"#);

        let calls = adapters.calls();
        let RelayOperation::Transcription(sent) = &calls[0].operation else {
            panic!("expected a transcription call");
        };
        assert_eq!(sent.model, "whisper-1");
        assert_eq!(sent.fields, vec![("language".to_string(), "en".to_string())]);
        assert_eq!(sent.files.len(), 1);
        assert_eq!(sent.files[0].field, "file");
        assert_eq!(sent.files[0].file_name.as_deref(), Some("clip.wav"));
        assert_eq!(sent.files[0].content_type.as_deref(), Some("audio/wav"));
    }

    #[tokio::test]
    async fn test_multipart_without_model_is_bad_request() {
        let adapters = MockAdapterFactory::new();
        let server = create_test_server(adapters.clone()).await;

        let form = MultipartForm::new().add_part(
            "image",
            Part::bytes(b"\x89PNG".to_vec()).file_name("a.png"),
        );
        let response = server.post("/v1/images/variations").multipart(form).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(adapters.call_count(), 0);
    }
}
