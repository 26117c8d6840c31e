use crate::structs::Position;
use rust_decimal::Decimal;

/// Read-only access to the live ledger.
///
/// Strategies and the capital allocator see the portfolio only through this
/// trait, so nothing outside the engine can mutate cash or positions.
pub trait PortfolioView {
    fn cash(&self) -> Decimal;
    fn total_value(&self) -> Decimal;
    fn position(&self, symbol: &str) -> Option<&Position>;
    fn positions(&self) -> Vec<&Position>;

    /// Signed quantity held in `symbol`, zero when flat.
    fn quantity(&self, symbol: &str) -> Decimal {
        self.position(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}
