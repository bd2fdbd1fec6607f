//! Distinguishable error type definitions

use shared::Host;
use std::time::Duration;
use thiserror::Error;

/// A failure while preparing or tearing down the cluster for a suite.
///
/// These are fatal: the affected suite is aborted without running (further) scenarios. Contrary
/// to scenario failures, they indicate a broken environment rather than a misbehaving
/// `gluster-block`.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Peers are not in connected state")]
    PeersDisconnected,
    #[error("At least {needed} servers are required, only {available} configured")]
    NotEnoughServers { needed: usize, available: usize },
    #[error("Failed to setup volume {volume}")]
    Volume {
        volume: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to set group option {group} on {volume}")]
    GroupOption {
        volume: String,
        group: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to restart {service} on {host}")]
    ServiceRestart {
        host: Host,
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{service} on {host} did not become active within {timeout:?}")]
    NotReady {
        host: Host,
        service: String,
        timeout: Duration,
    },
    #[error("Failed to cleanup volume {volume}")]
    Cleanup {
        volume: String,
        #[source]
        source: anyhow::Error,
    },
    /// Any other failure while talking to the cluster
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SetupError {
    pub fn volume(volume: impl ToString, source: anyhow::Error) -> Self {
        Self::Volume {
            volume: volume.to_string(),
            source,
        }
    }

    pub fn cleanup(volume: impl ToString, source: anyhow::Error) -> Self {
        Self::Cleanup {
            volume: volume.to_string(),
            source,
        }
    }
}

impl AsRef<dyn std::error::Error + 'static> for SetupError {
    fn as_ref(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

/// A `gluster-block` invocation that ran but reported failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("gluster-block failed with exit code {exit_code}: {message}")]
pub struct CliFailure {
    pub exit_code: i32,
    /// The `errCode` field of the JSON reply, if there was one
    pub err_code: Option<i64>,
    pub message: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::anyhow;
    use std::error::Error as _;

    #[test]
    fn setup_error_keeps_source() {
        let err = SetupError::volume("testvol", anyhow!("brick busy"));
        assert_eq!(err.to_string(), "Failed to setup volume testvol");
        assert_eq!(err.source().unwrap().to_string(), "brick busy");

        let err = SetupError::from(anyhow!("connection refused"));
        assert_eq!(err.to_string(), "connection refused");
    }
}
