use thiserror::Error;

/// Error taxonomy for the gateway core, per the error handling design:
/// local handling policy lives at the call site (retry, abandon candidate,
/// fold into tool result); this enum only carries the terminal shape.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error: status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("policy rejected: {0}")]
    PolicyRejected(String),

    #[error("tool loop exceeded {0} iterations")]
    ToolLoopExhausted(u32),

    #[error("canceled: {0}")]
    Canceled(String),

    #[error("embedding http error: status {0}")]
    EmbeddingHttp(u16),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short machine-readable code, for logs and aggregated failover strings.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::Transport(_) => "TRANSPORT_ERROR",
            GatewayError::ApiError { .. } => "API_ERROR",
            GatewayError::Parse(_) => "PARSE_ERROR",
            GatewayError::PolicyRejected(_) => "POLICY_REJECTED",
            GatewayError::ToolLoopExhausted(_) => "TOOL_LOOP_EXHAUSTED",
            GatewayError::Canceled(_) => "CANCELED",
            GatewayError::EmbeddingHttp(_) => "EMBEDDING_HTTP_ERROR",
            GatewayError::Database(_) => "DATABASE_ERROR",
            GatewayError::Serialization(_) => "SERIALIZATION_ERROR",
            GatewayError::Io(_) => "IO_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for 4xx (except 408, 429) — candidates should not be retried.
    /// False for every 5xx and transport error. Scans an untyped error's
    /// string for a 4xx integer when it isn't a typed `ApiError`.
    pub fn is_non_retryable(&self) -> bool {
        match self {
            GatewayError::ApiError { status, .. } => is_non_retryable_status(*status),
            GatewayError::Canceled(_) => true,
            GatewayError::Transport(_) => false,
            other => scan_for_non_retryable_status(&other.to_string()),
        }
    }
}

pub fn is_non_retryable_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

fn scan_for_non_retryable_status(message: &str) -> bool {
    let bytes = message.as_bytes();
    for i in 0..bytes.len().saturating_sub(2) {
        if bytes[i].is_ascii_digit() && bytes[i + 1].is_ascii_digit() && bytes[i + 2].is_ascii_digit()
        {
            let digit_run_start = i;
            let before_ok = i == 0 || !bytes[i - 1].is_ascii_digit();
            let after_ok = i + 3 == bytes.len() || !bytes[i + 3].is_ascii_digit();
            if before_ok && after_ok {
                if let Ok(n) = message[digit_run_start..digit_run_start + 3].parse::<u16>() {
                    if is_non_retryable_status(n) {
                        return true;
                    }
                }
            }
        }
    }
    false
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_covers_every_4xx_except_408_429() {
        for status in 400u16..500 {
            let expected = status != 408 && status != 429;
            assert_eq!(is_non_retryable_status(status), expected, "status {status}");
        }
    }

    #[test]
    fn retryable_covers_every_5xx() {
        for status in 500u16..600 {
            assert!(!is_non_retryable_status(status));
        }
    }

    #[test]
    fn transport_error_is_retryable() {
        let err = GatewayError::Transport("connection refused".into());
        assert!(!err.is_non_retryable());
    }

    #[test]
    fn untyped_error_scans_string_for_4xx() {
        let err = GatewayError::Internal("provider replied with 402 Payment Required".into());
        assert!(err.is_non_retryable());
    }

    #[test]
    fn untyped_error_scans_string_for_429_is_retryable() {
        let err = GatewayError::Internal("rate limited: 429 Too Many Requests".into());
        assert!(!err.is_non_retryable());
    }
}
