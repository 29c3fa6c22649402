//! Arrival refund tiers
//!
//! A driver who arrives within the full-refund window gets everything back,
//! within the grace window a partial refund, after that nothing.

use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundTier {
    Full,
    Partial,
    None,
}

impl RefundTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for RefundTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundPolicy {
    /// Arrival up to and including this offset is refunded in full.
    pub full_refund_window: Duration,
    /// Arrival after the full window and up to this offset is refunded partially.
    pub grace_window: Duration,
    /// Share of the price returned in the grace period.
    pub partial_refund_ratio: f64,
}

impl RefundPolicy {
    pub fn new(full_refund_window: Duration, grace_window: Duration) -> Self {
        Self {
            full_refund_window,
            grace_window: grace_window.max(full_refund_window),
            partial_refund_ratio: 0.5,
        }
    }

    /// 10 minutes full, 12 minutes grace.
    pub fn standard() -> Self {
        Self::new(Duration::minutes(10), Duration::minutes(12))
    }

    /// 20 minutes full, 22 minutes grace.
    pub fn extended() -> Self {
        Self::new(Duration::minutes(20), Duration::minutes(22))
    }

    pub fn with_partial_ratio(mut self, ratio: f64) -> Self {
        self.partial_refund_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Tier for an arrival `elapsed` after the booked instant. Early
    /// arrivals count as zero elapsed.
    pub fn tier_for(&self, elapsed: Duration) -> RefundTier {
        let elapsed = elapsed.max(Duration::zero());
        if elapsed <= self.full_refund_window {
            RefundTier::Full
        } else if elapsed <= self.grace_window {
            RefundTier::Partial
        } else {
            RefundTier::None
        }
    }

    /// Amount returned for `price` at the given tier.
    pub fn refund_amount(&self, tier: RefundTier, price: f64) -> f64 {
        match tier {
            RefundTier::Full => price,
            RefundTier::Partial => price * self.partial_refund_ratio,
            RefundTier::None => 0.0,
        }
    }
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
