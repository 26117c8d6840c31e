use crate::base::BaseStrategy;
use crate::context::StrategyContext;
use crate::error::StrategyError;
use crate::{Strategy, tracked_symbols};
use configuration::BuyAndHoldParams;
use core_types::{DataPoint, Order, OrderSide, Trade};
use rust_decimal::Decimal;
use serde_json::json;

/// Spends a fixed fraction of cash on the first tick that gets a fill, split
/// evenly across symbols, and then holds until the engine liquidates.
pub struct BuyAndHold {
    base: BaseStrategy,
    cash_fraction: Decimal,
    has_bought: bool,
}

impl BuyAndHold {
    pub fn new(params: BuyAndHoldParams, symbols: &[String]) -> Result<Self, StrategyError> {
        if params.cash_fraction <= Decimal::ZERO || params.cash_fraction > Decimal::ONE {
            return Err(StrategyError::InvalidParameters(format!(
                "cash_fraction must be in (0, 1], got {}",
                params.cash_fraction
            )));
        }
        let base = BaseStrategy::new(
            "buy_and_hold",
            json!({ "cash_fraction": params.cash_fraction.to_string() }),
        )
        .with_symbols(symbols);
        Ok(Self {
            base,
            cash_fraction: params.cash_fraction,
            has_bought: false,
        })
    }
}

impl Strategy for BuyAndHold {
    fn base(&self) -> &BaseStrategy {
        &self.base
    }

    fn initialize(&mut self, _ctx: &StrategyContext<'_>) -> Result<(), StrategyError> {
        self.has_bought = false;
        self.base.log_initialize();
        Ok(())
    }

    fn on_data_point(
        &mut self,
        ctx: &StrategyContext<'_>,
        data_point: &DataPoint,
    ) -> Result<Vec<Order>, StrategyError> {
        if self.has_bought {
            return Ok(Vec::new());
        }

        let symbols = tracked_symbols(&self.base, data_point);
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let budget = ctx.cash() * self.cash_fraction / Decimal::from(symbols.len());

        let mut orders = Vec::new();
        for symbol in symbols {
            let Some(bar) = data_point.bar(symbol) else { continue };
            if bar.close <= Decimal::ZERO {
                continue;
            }
            let quantity = (budget / bar.close).floor();
            if quantity > Decimal::ZERO {
                tracing::debug!(%symbol, %quantity, price = %bar.close, "Buy and hold entry");
                orders.push(
                    self.base
                        .market_order(symbol, OrderSide::Buy, quantity)
                        .with_reason("initial_buy"),
                );
            }
        }
        Ok(orders)
    }

    /// Entry is done once a buy of ours is filled; rejected orders are retried
    /// on the next tick.
    fn on_trade(&mut self, _ctx: &StrategyContext<'_>, trade: &Trade) -> Result<(), StrategyError> {
        if trade.side == OrderSide::Buy && trade.strategy == self.base.name() {
            self.has_bought = true;
        }
        self.base.log_trade(trade);
        Ok(())
    }
}
