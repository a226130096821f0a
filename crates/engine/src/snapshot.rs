use chrono::{DateTime, Utc};
use core_types::Position;
use risk::RiskState;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Everything the engine needs to resume where it left off: the rolling
/// window contents, the open position (if any), the session risk state, and
/// the high-water bar timestamp.
///
/// A snapshot is only loadable under the configuration that produced it; the
/// store keys it by the config fingerprint and the payload carries a content
/// hash over `(fingerprint, window)` so a tampered or torn row is refused
/// rather than resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub last_bar_ts: DateTime<Utc>,
    pub position: Option<Position>,
    pub risk: RiskState,
    /// Rolling window contents, oldest first.
    pub window: Vec<f64>,
}

/// Content hash binding a snapshot to its configuration and window.
pub fn window_hash(config_fingerprint: &str, window: &[f64]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config_fingerprint.as_bytes());
    for price in window {
        hasher.update(price.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let window = [5000.0, 5001.25, 4999.5];
        let a = window_hash("cfg", &window);
        let b = window_hash("cfg", &window);
        assert_eq!(a, b);

        assert_ne!(a, window_hash("other-cfg", &window));
        assert_ne!(a, window_hash("cfg", &[5000.0, 5001.25]));
        assert_ne!(a, window_hash("cfg", &[5000.0, 5001.25, 4999.75]));
    }
}
