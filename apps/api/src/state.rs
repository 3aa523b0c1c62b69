use crate::config::Config;
use crate::flows::engine::FlowEngine;
use crate::subscriptions::Subscriber;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: FlowEngine,
    pub config: Config,
    /// Live document subscriptions; denials go to the boot-time error listener.
    #[allow(dead_code)]
    pub subscriber: Subscriber,
}

#[cfg(test)]
pub fn test_state(stub: crate::llm_client::stub::StubGenerationService) -> AppState {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{DEFAULT_GEMINI_API_URL, DEFAULT_GEMINI_MODEL};
    use crate::flows::catalog::FlowCatalog;
    use crate::subscriptions::{ErrorPublisher, InMemoryDocumentSource};

    let catalog = FlowCatalog::load().expect("catalog loads");
    AppState {
        engine: FlowEngine::new(Arc::new(stub), Arc::new(catalog)),
        config: Config {
            gemini_api_key: "test-key".to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
            generation_timeout: Duration::from_secs(120),
            max_upload_bytes: 1024 * 1024,
            port: 0,
            rust_log: "info".to_string(),
        },
        subscriber: Subscriber::new(
            Arc::new(InMemoryDocumentSource::default()),
            ErrorPublisher::default(),
        ),
    }
}
