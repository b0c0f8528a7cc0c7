//! Error taxonomy for the Glacier service.
use thiserror::Error;

/// Flow-control and failure variants surfaced by the service layer.
///
/// The accrual engine itself is total and never produces one of these; only
/// the I/O boundaries do. The HTTP layer maps variants to status codes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("not found")] NotFound,
    #[error("relationship not found")] RelationNotFound,
    #[error("duplicate")] Duplicate,
    #[error("race condition")] RaceCondition,
    #[error("transaction for upgrading mining boost tier is invalid")] InvalidMiningBoostUpgradeTx,
    #[error("negative mining progress, a decision is required")] NegativeMiningProgressDecisionRequired { amount: f64 },
    #[error("kyc step(s) required: {steps:?}")] KycRequired { steps: Vec<u8> },
    #[error("mining is disabled")] MiningDisabled,
    #[error("global rank is hidden")] GlobalRankHidden,
    #[error("decreasing pre-staking allocation or years not allowed")] DecreasingPreStakingNotAllowed,
    #[error("invalid properties: {0}")] InvalidProperties(String),
    #[error("storage: {0}")] Storage(String),
    #[error("chain rpc: {0}")] ChainRpc(String),
    #[error("unexpected: {0}")] Unexpected(String),
}

impl Error {
    /// Fold a compensation failure into the primary error.
    ///
    /// The primary error's classification is kept when compensation succeeds;
    /// a failed compensation degrades the pair into [`Error::Unexpected`] with
    /// both causes appended.
    pub fn with_compensation(self, compensation: Result<(), Error>) -> Error {
        match compensation {
            Ok(()) => self,
            Err(comp) => Error::Unexpected(format!("{self}; compensation failed: {comp}")),
        }
    }
}

/// Failures from the chain RPC driver, kept separate so the boost-finalize
/// path can distinguish transient upstream trouble from a missing tx.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainRpcError {
    #[error("transaction not found")] NotFound,
    #[error("transient upstream failure, status {0}")] Transient(u16),
    #[error("rpc: {0}")] Other(String),
}

impl ChainRpcError {
    /// Whether the finalize path should sleep and retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainRpcError::Transient(status) if *status == 429 || *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compensation_success_keeps_classification() {
        let err = Error::Duplicate.with_compensation(Ok(()));
        assert_eq!(err, Error::Duplicate);
    }

    #[test]
    fn compensation_failure_degrades_to_unexpected() {
        let err = Error::Storage("hset failed".into())
            .with_compensation(Err(Error::Storage("delete failed".into())));
        match err {
            Error::Unexpected(msg) => {
                assert!(msg.contains("hset failed"));
                assert!(msg.contains("delete failed"));
            }
            other => panic!("expected Unexpected, got {other:?}"),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(ChainRpcError::Transient(429).is_transient());
        assert!(ChainRpcError::Transient(503).is_transient());
        assert!(!ChainRpcError::Transient(404).is_transient());
        assert!(!ChainRpcError::NotFound.is_transient());
    }
}
