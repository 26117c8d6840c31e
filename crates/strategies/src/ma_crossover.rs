use crate::base::BaseStrategy;
use crate::context::StrategyContext;
use crate::error::StrategyError;
use crate::{Strategy, tracked_symbols};
use configuration::{AllocationConfig, MACrossoverParams};
use core_types::{DataPoint, Order, OrderSide, Signal};
use risk::{CapitalAllocator, VolatilitySource};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;

/// The simple moving average crossover strategy.
///
/// A bullish cross (short SMA moves above the long SMA) on a flat symbol
/// becomes a signal for the capital allocator. A bearish cross on a long
/// symbol sells the whole position.
pub struct MACrossover {
    base: BaseStrategy,
    short_period: usize,
    long_period: usize,
    allocator: CapitalAllocator,
    // Previous (short, long) averages per symbol, to detect a crossover event.
    previous: HashMap<String, (Decimal, Decimal)>,
}

impl MACrossover {
    /// Creates a new `MACrossover` instance with the given parameters.
    ///
    /// It performs validation to ensure the parameters are logical.
    pub fn new(
        params: MACrossoverParams,
        allocation: AllocationConfig,
        symbols: &[String],
    ) -> Result<Self, StrategyError> {
        if params.short_period == 0 || params.short_period >= params.long_period {
            return Err(StrategyError::InvalidParameters(format!(
                "short period ({}) must be positive and less than long period ({})",
                params.short_period, params.long_period
            )));
        }

        let base = BaseStrategy::new(
            "ma_crossover",
            json!({ "short_period": params.short_period, "long_period": params.long_period }),
        )
        .with_symbols(symbols);

        Ok(Self {
            base,
            short_period: params.short_period,
            long_period: params.long_period,
            allocator: CapitalAllocator::new(allocation)?,
            previous: HashMap::new(),
        })
    }
}

/// 0.5 at no separation, scaled by the relative gap and clamped to `[0.1, 1]`.
fn crossover_confidence(short: Decimal, long: Decimal) -> Decimal {
    if long.is_zero() {
        return dec!(0.5);
    }
    let gap = (short - long) / long;
    (dec!(0.5) + gap * dec!(10)).clamp(dec!(0.1), Decimal::ONE)
}

impl Strategy for MACrossover {
    fn base(&self) -> &BaseStrategy {
        &self.base
    }

    fn initialize(&mut self, _ctx: &StrategyContext<'_>) -> Result<(), StrategyError> {
        self.previous.clear();
        self.base.log_initialize();
        Ok(())
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

            let (short, long) = match (
                indicators.sma(symbol, self.short_period),
                indicators.sma(symbol, self.long_period),
            ) {
                (Ok(short), Ok(long)) => (short, long),
                // Still warming up.
                (Err(StrategyError::InsufficientData { .. }), _)
                | (_, Err(StrategyError::InsufficientData { .. })) => continue,
                (Err(e), _) | (_, Err(e)) => return Err(e),
            };
            tracing::debug!(%symbol, %short, %long, "MACrossover averages");

            if let Some((prev_short, prev_long)) = self.previous.get(symbol).copied() {
                let quantity = ctx.quantity(symbol);
                let bullish = prev_short <= prev_long && short > long;
                let bearish = prev_short > prev_long && short <= long;

                if bullish && quantity.is_zero() {
                    let confidence = crossover_confidence(short, long);
                    tracing::info!(%symbol, %confidence, price = %bar.close, "Bullish crossover");
                    signals.push(
                        Signal::new(symbol, bar.close, "bullish_crossover")
                            .with_confidence(confidence)
                            .with_priority(confidence),
                    );
                } else if bearish && quantity > Decimal::ZERO {
                    tracing::info!(%symbol, %quantity, price = %bar.close, "Bearish crossover");
                    orders.push(
                        self.base
                            .market_order(symbol, OrderSide::Sell, quantity)
                            .with_reason("bearish_crossover"),
                    );
                }
            }

            self.previous.insert(symbol.to_string(), (short, long));
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
