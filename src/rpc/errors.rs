use solana_rpc_client_api::client_error::Error as ClientError;
use thiserror::Error;

/// RPC collaborator error types (non-submission calls)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerRpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound { account: String, endpoint: String },

    /// Account exists but its data is not what the caller expected
    #[error("Invalid account data for {account}: {reason}")]
    InvalidAccountData { account: String, reason: String },
}

impl LedgerRpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerRpcError::Transport { .. } => true,
            LedgerRpcError::Timeout { .. } => true,
            LedgerRpcError::RateLimitExceeded { .. } => true,

            LedgerRpcError::AccountNotFound { .. } => false,
            LedgerRpcError::InvalidAccountData { .. } => false,

            // Retry on server errors (5xx)
            LedgerRpcError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            LedgerRpcError::Transport { endpoint, .. } => Some(endpoint),
            LedgerRpcError::Timeout { endpoint, .. } => Some(endpoint),
            LedgerRpcError::RpcResponse { endpoint, .. } => Some(endpoint),
            LedgerRpcError::RateLimitExceeded { endpoint } => Some(endpoint),
            LedgerRpcError::AccountNotFound { endpoint, .. } => Some(endpoint),
            LedgerRpcError::InvalidAccountData { .. } => None,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: &ClientError, endpoint: &str) -> Self {
        Self::from_message(&err.to_string(), endpoint)
    }

    /// Classify based on error message
    pub fn from_message(message: &str, endpoint: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("account not found") || lower.contains("could not find account") {
            LedgerRpcError::AccountNotFound {
                account: "unknown".to_string(),
                endpoint: endpoint.to_string(),
            }
        } else if lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("429")
        {
            LedgerRpcError::RateLimitExceeded {
                endpoint: endpoint.to_string(),
            }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            LedgerRpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if lower.contains("error sending request") || lower.contains("connection") {
            LedgerRpcError::Transport {
                endpoint: endpoint.to_string(),
                message: message.to_string(),
            }
        } else {
            // Extract error code if available
            let code = lower
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            LedgerRpcError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: message.to_string(),
                code,
            }
        }
    }
}
