pub mod base;
pub mod configs;
pub mod ollama;
