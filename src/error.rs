use thiserror::Error;

pub type Result<T> = std::result::Result<T, RescueError>;

#[derive(Debug, Error)]
pub enum RescueError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("network error: {0}")]
    Net(#[from] RpcError),
    #[error("pair error: {0}")]
    Pair(#[from] PairError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Coarse transport classes surfaced to callers after retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    Timeout,
    Unavailable,
    RateLimited,
    Revert,
    NotContract,
    Other,
}

impl RpcErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcErrorKind::Timeout => "rpc_timeout",
            RpcErrorKind::Unavailable => "rpc_unavailable",
            RpcErrorKind::RateLimited => "rpc_rate_limited",
            RpcErrorKind::Revert => "revert",
            RpcErrorKind::NotContract => "not_contract",
            RpcErrorKind::Other => "rpc_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{} after {attempts} attempt(s): {message}", kind.as_str())]
    Exhausted {
        kind: RpcErrorKind,
        attempts: usize,
        message: String,
    },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no baseFee in header (pre-1559 chain?)")]
    NoBaseFee,
    #[error("malformed RPC payload: {0}")]
    BadPayload(String),
}

impl RpcError {
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            RpcError::Exhausted { kind, .. } => *kind,
            RpcError::Transport(_) => RpcErrorKind::Unavailable,
            _ => RpcErrorKind::Other,
        }
    }
}

/// Terminal, per-pair findings. Never retried.
#[derive(Debug, Error)]
pub enum PairError {
    #[error("invalid token address `{0}`")]
    BadTokenAddress(String),
    #[error("invalid recipient address `{0}`")]
    BadRecipientAddress(String),
    #[error("invalid private key")]
    BadPrivateKey,
    #[error("amount must be > 0")]
    ZeroAmount,
    #[error("no relays or matchmakers configured")]
    NoRelays,
    #[error("no attempts configured")]
    NoAttempts,
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("insufficient sponsor balance for fee+prefund: need {need_eth} ETH, have {have_eth} ETH")]
    InsufficientSponsorFunds { need_eth: String, have_eth: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_kind_strings() {
        assert_eq!(RpcErrorKind::Timeout.as_str(), "rpc_timeout");
        assert_eq!(RpcErrorKind::RateLimited.as_str(), "rpc_rate_limited");
        assert_eq!(RpcErrorKind::Unavailable.as_str(), "rpc_unavailable");
        assert_eq!(RpcErrorKind::Other.as_str(), "rpc_error");
    }

    #[test]
    fn test_exhausted_error_carries_kind() {
        let err = RpcError::Exhausted {
            kind: RpcErrorKind::RateLimited,
            attempts: 3,
            message: "429 Too Many Requests".into(),
        };
        assert_eq!(err.kind(), RpcErrorKind::RateLimited);
        assert!(err.to_string().contains("rpc_rate_limited"));
        assert!(err.to_string().contains("3 attempt(s)"));
    }
}
