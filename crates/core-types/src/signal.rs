use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The capability set a strategy exposes for each candidate trade it wants
/// the capital allocator to consider.
pub trait TradingSignal {
    fn symbol(&self) -> &str;
    /// Reference price used for sizing.
    fn price(&self) -> Decimal;
    /// In `[0, 1]`.
    fn confidence(&self) -> Decimal;
    /// Higher is more urgent.
    fn priority(&self) -> Decimal;
    /// Free-form tag, e.g. `bullish_crossover`. Becomes the order's reason.
    fn kind(&self) -> &str;
}

/// A plain-data `TradingSignal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub price: Decimal,
    pub confidence: Decimal,
    pub priority: Decimal,
    pub kind: String,
}

impl Signal {
    pub fn new(symbol: &str, price: Decimal, kind: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            confidence: Decimal::ONE,
            priority: Decimal::ONE,
            kind: kind.to_string(),
        }
    }

    pub fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence.clamp(Decimal::ZERO, Decimal::ONE);
        self
    }

    pub fn with_priority(mut self, priority: Decimal) -> Self {
        self.priority = priority;
        self
    }
}

impl TradingSignal for Signal {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn price(&self) -> Decimal {
        self.price
    }

    fn confidence(&self) -> Decimal {
        self.confidence
    }

    fn priority(&self) -> Decimal {
        self.priority
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}
