//! Question-answering session, configuration and corpus loading.

pub mod bootstrap;
pub mod config;
pub mod corpus;
pub mod error;
pub mod qa;

pub use config::Config;
pub use corpus::{CorpusSource, DirectoryCorpus};
pub use error::QaError;
pub use qa::{Answer, QaSession, QaState, SessionOptions};
