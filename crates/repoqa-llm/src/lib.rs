//! Chat and embedding provider abstraction for the question-answering loop.

pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;

pub use error::LlmError;
pub use provider::{LlmProvider, Message, Role};
pub use retry::RetryPolicy;
