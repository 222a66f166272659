//! Errors that cross the crate boundary.
//!
//! Each concern keeps its own error enum next to its code. `AgentError`
//! collects the ones that can stop the agent at startup or while running.
//! Everything raised inside a processing job stays inside that job's report.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::keys::KeyError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Entropy source failure. Terminates the agent.
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Peripheral channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether this error must abort the process rather than be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Key(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_entropy_failure_is_fatal() {
        let key: AgentError = KeyError::Entropy("no device".to_string()).into();
        assert!(key.is_fatal());
        assert_eq!(key.to_string(), "entropy source unavailable: no device");

        let config: AgentError = ConfigError::Invalid("segment".to_string()).into();
        assert!(!config.is_fatal());

        let io: AgentError = std::io::Error::other("disk").into();
        assert!(!io.is_fatal());
    }

    #[test]
    fn test_startup_errors_keep_their_source() {
        let err: AgentError = StoreError::Upload {
            key: "a.mp4".to_string(),
            message: "denied".to_string(),
        }
        .into();
        assert!(matches!(err, AgentError::Store(_)));
        assert!(err.to_string().starts_with("Object store error"));
    }
}
