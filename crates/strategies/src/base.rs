use core_types::{Order, OrderSide, Trade};
use rust_decimal::Decimal;
use serde_json::Value;

/// State and helpers shared by every strategy.
///
/// Concrete strategies own a `BaseStrategy` and hand it out through
/// [`Strategy::base`](crate::Strategy::base); the trait's default methods
/// delegate here.
#[derive(Debug, Clone)]
pub struct BaseStrategy {
    name: String,
    parameters: Value,
    symbols: Vec<String>,
    timeframe: String,
}

impl BaseStrategy {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            parameters,
            symbols: Vec::new(),
            timeframe: "1d".to_string(),
        }
    }

    pub fn with_symbols(mut self, symbols: &[String]) -> Self {
        self.symbols = symbols.to_vec();
        self
    }

    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = timeframe.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn market_order(&self, symbol: &str, side: OrderSide, quantity: Decimal) -> Order {
        Order::market(symbol, side, quantity).with_strategy(self.name.as_str())
    }

    pub fn limit_order(&self, symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Order {
        Order::limit(symbol, side, quantity, price).with_strategy(self.name.as_str())
    }

    pub fn stop_order(&self, symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Order {
        Order::stop(symbol, side, quantity, price).with_strategy(self.name.as_str())
    }

    pub(crate) fn log_initialize(&self) {
        tracing::info!(strategy = %self.name, symbols = ?self.symbols, parameters = %self.parameters, "Initializing strategy");
    }

    pub(crate) fn log_trade(&self, trade: &Trade) {
        tracing::info!(
            strategy = %self.name,
            trade_id = trade.trade_id,
            symbol = %trade.symbol,
            side = %trade.side,
            quantity = %trade.quantity,
            price = %trade.price,
            "Trade executed"
        );
    }

    pub(crate) fn log_cleanup(&self) {
        tracing::info!(strategy = %self.name, "Cleaning up strategy");
    }
}
