use crate::error::ExecutorError;
use crate::fees::FeeSchedule;
use configuration::{Simulation, SlippageMode};
use core_types::{Bar, Order, OrderSide, OrderType, Trade};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// Resolution of the uniform slippage draw.
const NOISE_STEPS: u32 = 1_000_000;

/// A generic trait for an execution engine.
///
/// The backtester talks to the broker only through this trait, so the fill
/// model can be swapped without touching the simulation loop.
pub trait Executor: Send {
    /// Fills `order` against `bar` and returns the resulting `Trade`.
    ///
    /// This function calculates the costs of the trade (fees, slippage) but crucially
    /// **does not modify the portfolio state itself**. The caller is responsible for
    /// applying the returned `Trade` to the ledger.
    fn execute(&mut self, order: &Order, bar: &Bar) -> Result<Trade, ExecutorError>;

    /// Whether `order` would fill against `bar`. Never mutates state.
    fn can_execute(&self, order: &Order, bar: &Bar) -> bool {
        self.execution_price(order, bar).is_ok()
    }

    /// The price `order` would fill at against `bar`, before any random
    /// slippage component. Never mutates state.
    fn execution_price(&self, order: &Order, bar: &Bar) -> Result<Decimal, ExecutorError>;

    /// The fee model applied to fills.
    fn fees(&self) -> &FeeSchedule;
}

/// The "virtual exchange" for backtesting.
///
/// It holds the simulation parameters and implements the `Executor` trait to
/// create trades with realistic costs.
pub struct SimulatedExecutor {
    fees: FeeSchedule,
    slippage: Decimal,
    max_slippage: Decimal,
    mode: SlippageMode,
    rng: StdRng,
    next_trade_id: u64,
}

impl SimulatedExecutor {
    pub fn new(params: &Simulation) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            fees: FeeSchedule::new(params),
            slippage: params.slippage,
            max_slippage: params.max_slippage,
            mode: params.slippage_mode,
            rng,
            next_trade_id: 1,
        }
    }

    /// The number of trades produced so far.
    pub fn trade_count(&self) -> u64 {
        self.next_trade_id - 1
    }

    /// Draws the random slippage component for one fill.
    fn draw_noise(&mut self) -> Decimal {
        if self.mode != SlippageMode::Noisy || self.max_slippage <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let step = self.rng.gen_range(0..NOISE_STEPS);
        self.max_slippage * Decimal::from(step) / Decimal::from(NOISE_STEPS)
    }

    /// Applies the order type's trigger rule and returns `(fill, reference)`.
    fn resolve_fill(
        &self,
        order: &Order,
        bar: &Bar,
        slippage: Decimal,
    ) -> Result<(Decimal, Decimal), ExecutorError> {
        let adverse = |price: Decimal| match order.side {
            // Buys pay a premium, sells receive a discount.
            OrderSide::Buy => price * (Decimal::ONE + slippage),
            OrderSide::Sell => price * (Decimal::ONE - slippage),
        };
        let not_fillable = |reason: String| ExecutorError::OrderNotFillable {
            symbol: order.symbol.clone(),
            reason,
        };

        match order.order_type {
            OrderType::Market => Ok((adverse(bar.close), bar.close)),
            OrderType::Limit => {
                let limit = order
                    .limit_price
                    .ok_or_else(|| ExecutorError::InvalidOrder("limit order without a limit price".into()))?;
                let touched = match order.side {
                    OrderSide::Buy => bar.low <= limit,
                    OrderSide::Sell => bar.high >= limit,
                };
                if touched {
                    Ok((limit, limit))
                } else {
                    Err(not_fillable(format!(
                        "{} limit {} outside bar range [{}, {}]",
                        order.side, limit, bar.low, bar.high
                    )))
                }
            }
            OrderType::Stop => {
                let stop = order
                    .stop_price
                    .ok_or_else(|| ExecutorError::InvalidOrder("stop order without a stop price".into()))?;
                let triggered = match order.side {
                    OrderSide::Buy => bar.high >= stop,
                    OrderSide::Sell => bar.low <= stop,
                };
                if triggered {
                    Ok((adverse(stop), bar.close))
                } else {
                    Err(not_fillable(format!(
                        "{} stop {} not triggered by bar range [{}, {}]",
                        order.side, stop, bar.low, bar.high
                    )))
                }
            }
        }
    }

    fn check_order(order: &Order, bar: &Bar) -> Result<(), ExecutorError> {
        order.validate()?;
        if order.symbol != bar.symbol {
            return Err(ExecutorError::SymbolMismatch {
                order_symbol: order.symbol.clone(),
                bar_symbol: bar.symbol.clone(),
            });
        }
        Ok(())
    }
}

impl Executor for SimulatedExecutor {
    fn execute(&mut self, order: &Order, bar: &Bar) -> Result<Trade, ExecutorError> {
        tracing::debug!(symbol = %order.symbol, side = %order.side, order_type = %order.order_type, quantity = %order.quantity, "Executing order");
        Self::check_order(order, bar)?;

        // Limit fills are priced at the limit itself; only market and stop
        // fills carry slippage.
        let noise = match order.order_type {
            OrderType::Limit => Decimal::ZERO,
            OrderType::Market | OrderType::Stop => self.draw_noise(),
        };
        let (price, reference) = self.resolve_fill(order, bar, self.slippage + noise)?;

        let fees = self.fees.calculate(order.side, order.quantity, price);
        let trade = Trade {
            trade_id: self.next_trade_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            timestamp: bar.timestamp,
            commission: fees.commission,
            regulatory_fee: fees.regulatory_fee,
            activity_fee: fees.activity_fee,
            slippage: (price - reference).abs() * order.quantity,
            strategy: order.strategy.clone(),
            reason: order.reason.clone(),
        };
        self.next_trade_id += 1;

        tracing::debug!(trade_id = trade.trade_id, price = %trade.price, fees = %trade.total_fees(), slippage = %trade.slippage, "Order filled");
        Ok(trade)
    }

    fn execution_price(&self, order: &Order, bar: &Bar) -> Result<Decimal, ExecutorError> {
        Self::check_order(order, bar)?;
        self.resolve_fill(order, bar, self.slippage).map(|(price, _)| price)
    }

    fn fees(&self) -> &FeeSchedule {
        &self.fees
    }
}
