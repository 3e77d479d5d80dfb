//! The conversation objects passed between the page and the backend
//!
//! Three related wire formats meet here:
//! - useChat-style messages, sent from the page to the chat endpoint
//! - data-stream parts, sent from the chat endpoint back to the page
//! - ollama chat messages, sent from the provider to the inference server
//!
//! All of them are converted at the boundary into the structs below, which is
//! why these are not an exact match to any single format.
pub mod message;
pub mod role;
