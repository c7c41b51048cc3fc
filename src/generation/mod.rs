//! Structured generation against an external text-generation service.

pub mod backend;
pub mod connector;
pub mod prompt;

pub use backend::{GenerationBackend, OllamaBackend};
pub use connector::{GenerationConnector, Validator};
