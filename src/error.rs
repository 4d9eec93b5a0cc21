//! Error types for the bridge core.
//!
//! Protocol-level failures are typed so callers can decide between logging,
//! reverting and degrading. Application plumbing (config files, main) uses
//! `anyhow` instead.

/// Unified error type for bridge operations
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Endpoint creation attempted after the initialization phase ended
    #[error("Lifecycle violation: cannot {operation} after initialization")]
    LifecycleViolation { operation: &'static str },

    /// Bind, connect, encode or send failure on a UDP endpoint
    #[error("Transport error on {target}: {source}")]
    Transport {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Rejected device port value
    #[error("Invalid device port '{value}': {reason}")]
    Validation { value: String, reason: &'static str },
}

impl BridgeError {
    pub fn lifecycle(operation: &'static str) -> Self {
        Self::LifecycleViolation { operation }
    }

    pub fn transport(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            target: target.into(),
            source,
        }
    }

    pub fn validation(value: impl Into<String>, reason: &'static str) -> Self {
        Self::Validation {
            value: value.into(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
