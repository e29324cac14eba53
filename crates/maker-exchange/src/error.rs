//! Structured exchange errors and their classification.
//!
//! Error codes follow the Bybit v5 convention the original client spoke.
//! Classification drives the retry policy: transient errors back off and
//! retry, formatting errors trigger an in-place correction, and
//! non-recoverable errors abort the placement immediately.

use rust_decimal::Decimal;
use thiserror::Error;

/// Rate limit exceeded on the exchange side.
const CODE_RATE_LIMIT: i64 = 10006;
/// Internal server error.
const CODE_SERVER_ERROR: i64 = 10016;
/// Request parameter error (bad price/qty precision).
const CODE_PARAM_ERROR: i64 = 10001;
/// Order value below the minimum notional.
const CODE_MIN_ORDER_VALUE: i64 = 110094;
/// Order does not exist or is too late to cancel.
const CODE_ORDER_NOT_EXISTS: i64 = 110001;
/// Insufficient balance variants.
const CODES_INSUFFICIENT: [i64; 3] = [170131, 170032, 170033];
/// No new positions accepted during delisting.
const CODE_DELISTING: i64 = 30228;

/// Error from the exchange client.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Structured API rejection with the exchange's error code.
    #[error("exchange error {code}: {message}")]
    Api { code: i64, message: String },

    /// Network-level failure (connect, 5xx, decode).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request timed out before a response arrived.
    #[error("exchange request timed out")]
    Timeout,
}

impl ExchangeError {
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Exchange error code, if the error carries one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    fn message_contains(&self, needle: &str) -> bool {
        match self {
            Self::Api { message, .. } => message.to_lowercase().contains(needle),
            _ => false,
        }
    }

    /// Transient failures: retried with backoff, not counted against the
    /// trading-level retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Api { code, .. } => *code == CODE_RATE_LIMIT || *code == CODE_SERVER_ERROR,
        }
    }

    /// The order value fell below the instrument's minimum notional.
    pub fn is_below_min_notional(&self) -> bool {
        self.code() == Some(CODE_MIN_ORDER_VALUE) || self.message_contains("minimum order value")
    }

    /// Price or quantity did not match the instrument's precision rules.
    pub fn is_precision_reject(&self) -> bool {
        self.code() == Some(CODE_PARAM_ERROR)
            || self.message_contains("precision")
            || self.message_contains("invalid qty")
    }

    /// Client-side formatting defect, corrected via instrument rules and
    /// resubmitted without consuming a retry.
    pub fn is_format_reject(&self) -> bool {
        self.is_below_min_notional() || self.is_precision_reject()
    }

    /// Rejections that must never be retried: insufficient balance and
    /// delisting freezes.
    pub fn is_non_recoverable(&self) -> bool {
        match self.code() {
            Some(code) if CODES_INSUFFICIENT.contains(&code) || code == CODE_DELISTING => true,
            _ => {
                self.message_contains("insufficient balance")
                    || self.message_contains("delisting")
                    || self.message_contains("no new positions during")
            }
        }
    }

    /// Cancel raced a fill: the order is no longer open on the exchange.
    /// Treated as the success path after a status check, not as an error.
    pub fn is_order_not_open(&self) -> bool {
        self.code() == Some(CODE_ORDER_NOT_EXISTS)
            || self.message_contains("order not exists")
            || self.message_contains("too late to cancel")
    }

    /// Extract the minimum order value the exchange hinted at in its
    /// rejection text (e.g. "Order value must be at least 5 USDT").
    pub fn hinted_min_notional(&self) -> Option<Decimal> {
        let Self::Api { message, .. } = self else {
            return None;
        };
        let mut prev: Option<&str> = None;
        for token in message.split_whitespace() {
            let trimmed = token.trim_end_matches(|c: char| c.is_ascii_punctuation());
            if trimmed.eq_ignore_ascii_case("usdt") {
                if let Some(p) = prev {
                    if let Ok(v) = p.parse::<Decimal>() {
                        return Some(v);
                    }
                }
            } else if let Some(num) = trimmed.strip_suffix("USDT").or_else(|| trimmed.strip_suffix("usdt")) {
                if let Ok(v) = num.parse::<Decimal>() {
                    return Some(v);
                }
            }
            prev = Some(trimmed);
        }
        None
    }
}

/// Result type alias for exchange operations.
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::Timeout.is_transient());
        assert!(ExchangeError::Transport("connection reset".into()).is_transient());
        assert!(ExchangeError::api(10006, "rate limit exceeded").is_transient());
        assert!(!ExchangeError::api(110094, "order value too low").is_transient());
    }

    #[test]
    fn test_min_notional_classification() {
        let err = ExchangeError::api(110094, "Order value exceeded lower limit");
        assert!(err.is_below_min_notional());
        assert!(err.is_format_reject());

        let by_message = ExchangeError::api(0, "minimum order value not met");
        assert!(by_message.is_below_min_notional());
    }

    #[test]
    fn test_non_recoverable_classification() {
        assert!(ExchangeError::api(170131, "Insufficient balance").is_non_recoverable());
        assert!(ExchangeError::api(30228, "no new positions during delisting").is_non_recoverable());
        assert!(!ExchangeError::api(110094, "order value too low").is_non_recoverable());
    }

    #[test]
    fn test_order_not_open_classification() {
        let err = ExchangeError::api(110001, "order not exists or too late to cancel");
        assert!(err.is_order_not_open());
    }

    #[test]
    fn test_hinted_min_notional_parsing() {
        let err = ExchangeError::api(110094, "Order value must be at least 5 USDT");
        assert_eq!(err.hinted_min_notional(), Some(dec!(5)));

        let glued = ExchangeError::api(110094, "minimum order value is 10.5USDT.");
        assert_eq!(glued.hinted_min_notional(), Some(dec!(10.5)));

        let none = ExchangeError::api(110094, "order value too low");
        assert_eq!(none.hinted_min_notional(), None);
    }
}
