use thiserror::Error;

use crate::assert::AssertionFailure;
use crate::config::ConfigError;
use crate::scenario::ScenarioError;
use crate::target::TxError;
use crate::units::EtherParseError;
use crate::verify::InvalidRecord;

/// Any error the harness can surface to its caller.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A transaction or read against the target failed.
    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A transaction record could not be turned into a cost.
    #[error(transparent)]
    InvalidRecord(#[from] InvalidRecord),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("invalid ether amount: {0}")]
    InvalidEther(#[from] EtherParseError),

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse input: {0}")]
    Json(#[from] serde_json::Error),
}
