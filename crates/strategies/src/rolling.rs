use std::collections::VecDeque;

use crate::error::StrategyError;

/// Epsilon under which the window is treated as having no variance at all.
/// The Z-score is defined as 0 there rather than dividing by a denormal.
const VARIANCE_EPSILON: f64 = 1e-10;

/// Numerically stable rolling mean, standard deviation, and Z-score over a
/// fixed-length sliding window of prices.
///
/// Arithmetic is centred on an anchor price `K` taken from the first admitted
/// sample: the running sums hold `S = Σ(x - K)` and `Q = Σ(x - K)²`, so the
/// magnitudes involved stay comparable to the *deviations* rather than the
/// raw price level. The textbook identity `E[x²] - E[x]²` cancels
/// catastrophically exactly in the regime real prices live in (values near
/// 6,000 with intra-window moves under 1) and is deliberately not used.
///
/// When the anchor itself slides out of the window the sums are re-based onto
/// the new front sample using the exact shift identities, so a long-running
/// stream never drifts away from its anchor.
#[derive(Debug, Clone)]
pub struct RollingStats {
    prices: VecDeque<f64>,
    lookback: usize,
    /// Anchor for the shifted sums; the first admitted price, re-based on
    /// eviction of the anchor sample.
    anchor: f64,
    /// Σ(x - anchor) over the window.
    shifted_sum: f64,
    /// Σ(x - anchor)² over the window.
    shifted_sq_sum: f64,
}

impl RollingStats {
    /// Creates an empty window. A lookback below 2 cannot produce a sample
    /// standard deviation and is rejected.
    pub fn new(lookback: usize) -> Result<Self, StrategyError> {
        if lookback < 2 {
            return Err(StrategyError::InvalidParameters(format!(
                "lookback must be at least 2, got {lookback}"
            )));
        }
        Ok(Self {
            prices: VecDeque::with_capacity(lookback + 1),
            lookback,
            anchor: 0.0,
            shifted_sum: 0.0,
            shifted_sq_sum: 0.0,
        })
    }

    /// Admits a price and slides the window. Returns the Z-score of the new
    /// price once the window is full, `None` while warming up.
    pub fn update(&mut self, price: f64) -> Result<Option<f64>, StrategyError> {
        if !price.is_finite() {
            return Err(StrategyError::NonFiniteInput(price));
        }

        if self.prices.is_empty() {
            self.anchor = price;
        }

        let dx = price - self.anchor;
        self.shifted_sum += dx;
        self.shifted_sq_sum += dx * dx;
        self.prices.push_back(price);

        if self.prices.len() > self.lookback {
            let evicting_anchor = self
                .prices
                .front()
                .map(|&front| (front - self.anchor).abs() < f64::EPSILON)
                .unwrap_or(false);

            if let Some(old) = self.prices.pop_front() {
                let dx = old - self.anchor;
                self.shifted_sum -= dx;
                self.shifted_sq_sum -= dx * dx;

                if evicting_anchor {
                    if let Some(&new_anchor) = self.prices.front() {
                        self.rebase(new_anchor);
                    }
                }
            }
        }

        Ok(self.zscore())
    }

    /// Re-bases the running sums onto a new anchor without touching the
    /// window contents. With δ = old − new:
    /// `S' = Σ(x - new) = S + n·δ` and `Q' = Σ(x - new)² = Q + 2δS + n·δ²`.
    fn rebase(&mut self, new_anchor: f64) {
        let shift = self.anchor - new_anchor;
        let n = self.prices.len() as f64;
        let old_sum = self.shifted_sum;

        self.anchor = new_anchor;
        self.shifted_sum = old_sum + n * shift;
        self.shifted_sq_sum += 2.0 * shift * old_sum + n * shift * shift;
    }

    /// Z-score of the most recent price, `None` until the window is full.
    pub fn zscore(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        let current = *self.prices.back()?;
        let variance = self.variance()?;
        if variance < VARIANCE_EPSILON {
            return Some(0.0);
        }
        let mean = self.mean()?;
        Some((current - mean) / variance.sqrt())
    }

    /// Mean of the current window contents.
    pub fn mean(&self) -> Option<f64> {
        if self.prices.is_empty() {
            return None;
        }
        Some(self.anchor + self.shifted_sum / self.prices.len() as f64)
    }

    /// Sample variance `(Q - S²/n) / (n - 1)`, clamped at zero to mask
    /// floating-point underflow. Needs at least two samples.
    pub fn variance(&self) -> Option<f64> {
        let n = self.prices.len() as f64;
        if n < 2.0 {
            return None;
        }
        let variance =
            (self.shifted_sq_sum - (self.shifted_sum * self.shifted_sum) / n) / (n - 1.0);
        Some(variance.max(0.0))
    }

    /// Sample standard deviation of the current window contents.
    pub fn std(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    pub fn is_ready(&self) -> bool {
        self.prices.len() >= self.lookback
    }

    pub fn count(&self) -> usize {
        self.prices.len()
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Window contents, oldest first. Used for snapshots and restart.
    pub fn contents(&self) -> Vec<f64> {
        self.prices.iter().copied().collect()
    }

    /// Empties the window and drops all history.
    pub fn reset(&mut self) {
        self.prices.clear();
        self.anchor = 0.0;
        self.shifted_sum = 0.0;
        self.shifted_sq_sum = 0.0;
    }
}
