use tinychat::providers::configs::OllamaProviderConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ollama: OllamaProviderConfig,
    pub models: Vec<String>,
}
