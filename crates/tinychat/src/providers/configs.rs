// Configuration for the inference backend. The model is not part of the
// config: it is client-supplied on every request.
#[derive(Debug, Clone)]
pub struct OllamaProviderConfig {
    pub host: String,
}
