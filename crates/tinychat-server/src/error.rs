use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: set {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings path back to the environment variable that sets it
pub fn to_env_var(field: &str) -> String {
    format!("TINYCHAT_{}", field.replace('.', "__").to_uppercase())
}
