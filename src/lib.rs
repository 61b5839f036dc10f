pub mod chat;
pub mod client;
pub mod constants;
pub mod error;
pub mod post;

pub use client::{GenerationClient, GenerationOutcome, TransportError, TransportErrorKind};
pub use error::GenerationError;
pub use post::{Category, GeneratedPost, ValidationReport, Violation};
