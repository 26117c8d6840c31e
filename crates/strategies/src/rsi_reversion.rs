use crate::base::BaseStrategy;
use crate::context::StrategyContext;
use crate::error::StrategyError;
use crate::{Strategy, tracked_symbols};
use configuration::{AllocationConfig, RsiReversionParams};
use core_types::{DataPoint, Order, OrderSide, Signal};
use risk::{CapitalAllocator, VolatilitySource};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

/// Buys oversold symbols and exits once they turn overbought.
pub struct RsiReversion {
    base: BaseStrategy,
    period: usize,
    oversold: Decimal,
    overbought: Decimal,
    allocator: CapitalAllocator,
}

impl RsiReversion {
    pub fn new(
        params: RsiReversionParams,
        allocation: AllocationConfig,
        symbols: &[String],
    ) -> Result<Self, StrategyError> {
        if params.period == 0 {
            return Err(StrategyError::InvalidParameters(
                "RSI period must be positive".to_string(),
            ));
        }
        let hundred = Decimal::ONE_HUNDRED;
        if params.oversold <= Decimal::ZERO
            || params.overbought >= hundred
            || params.oversold >= params.overbought
        {
            return Err(StrategyError::InvalidParameters(format!(
                "RSI levels must satisfy 0 < oversold ({}) < overbought ({}) < 100",
                params.oversold, params.overbought
            )));
        }

        let base = BaseStrategy::new(
            "rsi_reversion",
            json!({
                "period": params.period,
                "oversold": params.oversold.to_string(),
                "overbought": params.overbought.to_string(),
            }),
        )
        .with_symbols(symbols);

        Ok(Self {
            base,
            period: params.period,
            oversold: params.oversold,
            overbought: params.overbought,
            allocator: CapitalAllocator::new(allocation)?,
        })
    }

    /// Deeper into oversold territory means higher confidence.
    fn confidence(&self, rsi: Decimal) -> Decimal {
        let depth = (self.oversold - rsi) / self.oversold;
        (dec!(0.5) + depth).clamp(dec!(0.1), Decimal::ONE)
    }
}

impl Strategy for RsiReversion {
    fn base(&self) -> &BaseStrategy {
        &self.base
    }

    fn on_data_point(
        &mut self,
        ctx: &StrategyContext<'_>,
        data_point: &DataPoint,
    ) -> Result<Vec<Order>, StrategyError> {
        let indicators = ctx.indicators();
        let mut orders = Vec::new();
        let mut signals = Vec::new();

        for symbol in tracked_symbols(&self.base, data_point) {
            let Some(bar) = data_point.bar(symbol) else { continue };
            let rsi = match indicators.rsi(symbol, self.period) {
                Ok(rsi) => rsi,
                Err(StrategyError::InsufficientData { .. }) => continue,
                Err(e) => return Err(e),
            };
            let quantity = ctx.quantity(symbol);
            tracing::debug!(%symbol, %rsi, %quantity, price = %bar.close, "RSI analysis");

            if rsi <= self.oversold && quantity.is_zero() {
                tracing::info!(%symbol, %rsi, "RSI oversold");
                let confidence = self.confidence(rsi);
                signals.push(
                    Signal::new(symbol, bar.close, "rsi_oversold")
                        .with_confidence(confidence)
                        .with_priority(confidence),
                );
            } else if rsi >= self.overbought && quantity > Decimal::ZERO {
                tracing::info!(%symbol, %rsi, %quantity, "RSI overbought");
                orders.push(
                    self.base
                        .market_order(symbol, OrderSide::Sell, quantity)
                        .with_reason("rsi_overbought"),
                );
            }
        }

        if !signals.is_empty() {
            let volatility: &dyn VolatilitySource = indicators;
            orders.extend(self.allocator.allocate(
                &signals,
                ctx.portfolio(),
                self.base.name(),
                Some(volatility),
            ));
        }
        Ok(orders)
    }
}
