use crate::error::RiskError;
use configuration::{AllocationConfig, AllocationMethod};
use core_types::{Order, OrderSide, PortfolioView, TradingSignal};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Fractional quantities are truncated to this many decimal places.
const FRACTIONAL_DP: u32 = 8;

/// A read-only source of realised volatility per symbol.
pub trait VolatilitySource {
    /// Recent volatility as a fraction (0.02 = 2 %), or `None` when unknown.
    fn volatility(&self, symbol: &str) -> Option<Decimal>;
}

/// Divides the ledger's cash among competing signals from one strategy tick.
#[derive(Debug, Clone)]
pub struct CapitalAllocator {
    params: AllocationConfig,
}

impl CapitalAllocator {
    /// Creates a new `CapitalAllocator` with the given configuration parameters.
    pub fn new(params: AllocationConfig) -> Result<Self, RiskError> {
        if params.position_size <= Decimal::ZERO || params.position_size > Decimal::ONE {
            return Err(RiskError::InvalidParameters(format!(
                "position_size must be in (0, 1], got {}",
                params.position_size
            )));
        }
        if params.slippage_buffer < Decimal::ZERO || params.slippage_buffer >= Decimal::ONE {
            return Err(RiskError::InvalidParameters(format!(
                "slippage_buffer must be in [0, 1), got {}",
                params.slippage_buffer
            )));
        }
        if params.min_cash_buffer < Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "min_cash_buffer must not be negative".to_string(),
            ));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &AllocationConfig {
        &self.params
    }

    /// Produces market buy orders for the best-ranked signals.
    ///
    /// The combined notional (`quantity * signal price`) of the returned
    /// orders never exceeds the tradable cash, i.e. cash less the slippage
    /// buffer. Nothing is returned while cash is at or below the minimum
    /// buffer.
    pub fn allocate<S: TradingSignal>(
        &self,
        signals: &[S],
        portfolio: &dyn PortfolioView,
        strategy: &str,
        volatility: Option<&dyn VolatilitySource>,
    ) -> Vec<Order> {
        if signals.is_empty() {
            return Vec::new();
        }

        let cash = portfolio.cash();
        if cash <= self.params.min_cash_buffer {
            tracing::warn!(%cash, min_buffer = %self.params.min_cash_buffer, "Insufficient cash for trading");
            return Vec::new();
        }

        let tradable = cash * (Decimal::ONE - self.params.slippage_buffer);
        if tradable < self.params.min_cash_buffer {
            return Vec::new();
        }

        let mut ranked: Vec<&S> = signals.iter().collect();
        self.rank(&mut ranked);
        if self.params.max_positions > 0 {
            ranked.truncate(self.params.max_positions);
        }

        tracing::debug!(
            total_signals = signals.len(),
            selected_signals = ranked.len(),
            %cash,
            %tradable,
            method = ?self.params.method,
            "Allocating capital to signals"
        );

        let sizer = Sizer {
            params: &self.params,
            volatility,
            strategy,
        };
        let orders = match self.params.method {
            AllocationMethod::Equal => sizer.equal(&ranked, tradable),
            AllocationMethod::Confidence => sizer.weighted(&ranked, tradable, |s| s.confidence()),
            AllocationMethod::Priority => sizer.weighted(&ranked, tradable, |s| s.priority()),
            AllocationMethod::Sequential => sizer.sequential(&ranked, tradable),
        };

        tracing::debug!(orders_created = orders.len(), "Capital allocation completed");
        orders
    }

    /// Stable sort, best first.
    fn rank<S: TradingSignal>(&self, signals: &mut [&S]) {
        match self.params.method {
            AllocationMethod::Confidence | AllocationMethod::Sequential => signals.sort_by(|a, b| {
                b.confidence()
                    .cmp(&a.confidence())
                    .then_with(|| b.priority().cmp(&a.priority()))
            }),
            AllocationMethod::Priority => signals.sort_by(|a, b| {
                b.priority()
                    .cmp(&a.priority())
                    .then_with(|| b.confidence().cmp(&a.confidence()))
            }),
            AllocationMethod::Equal => {}
        }
    }
}

struct Sizer<'a> {
    params: &'a AllocationConfig,
    volatility: Option<&'a dyn VolatilitySource>,
    strategy: &'a str,
}

impl Sizer<'_> {
    fn equal<S: TradingSignal>(&self, signals: &[&S], tradable: Decimal) -> Vec<Order> {
        let per_signal = tradable * self.params.position_size / Decimal::from(signals.len());
        signals
            .iter()
            .filter_map(|signal| {
                let quantity = self.quantity(*signal, per_signal);
                (quantity > Decimal::ZERO).then(|| self.order(*signal, quantity))
            })
            .collect()
    }

    fn weighted<S: TradingSignal>(
        &self,
        signals: &[&S],
        tradable: Decimal,
        weight: impl Fn(&S) -> Decimal,
    ) -> Vec<Order> {
        let total_weight: Decimal = signals.iter().map(|s| weight(*s)).sum();
        if total_weight <= Decimal::ZERO {
            return self.equal(signals, tradable);
        }

        let budget = tradable * self.params.position_size;
        let mut remaining = budget;
        let mut orders = Vec::new();

        for (i, signal) in signals.iter().enumerate() {
            if remaining <= self.params.min_cash_buffer {
                break;
            }
            let allocation = if i == signals.len() - 1 {
                // Last signal takes the residue.
                remaining
            } else {
                (budget * weight(*signal) / total_weight).min(remaining)
            };

            let quantity = self.quantity(*signal, allocation);
            if quantity <= Decimal::ZERO {
                continue;
            }
            let cost = quantity * signal.price();
            if cost <= remaining {
                remaining -= cost;
                tracing::debug!(symbol = signal.symbol(), %quantity, %cost, %remaining, "Weighted allocation");
                orders.push(self.order(*signal, quantity));
            }
        }
        orders
    }

    fn sequential<S: TradingSignal>(&self, signals: &[&S], tradable: Decimal) -> Vec<Order> {
        let mut remaining = tradable;
        let mut orders = Vec::new();

        for signal in signals {
            if remaining <= self.params.min_cash_buffer {
                tracing::debug!(%remaining, "Insufficient remaining cash for more signals");
                break;
            }
            let fraction = self.params.position_size.min(remaining / tradable);
            let quantity = self.quantity(*signal, remaining * fraction);
            if quantity <= Decimal::ZERO {
                continue;
            }
            let cost = quantity * signal.price();
            if cost <= remaining {
                remaining -= cost;
                tracing::debug!(symbol = signal.symbol(), %quantity, %cost, %remaining, "Sequential allocation");
                orders.push(self.order(*signal, quantity));
            } else {
                tracing::debug!(symbol = signal.symbol(), %cost, %remaining, "Insufficient cash for signal");
            }
        }
        orders
    }

    fn quantity<S: TradingSignal>(&self, signal: &S, allocation: Decimal) -> Decimal {
        let price = signal.price();
        if allocation <= Decimal::ZERO || price <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let mut quantity = allocation / price;
        if self.params.volatility_adjust {
            if let Some(vol) = self.volatility.and_then(|v| v.volatility(signal.symbol())) {
                quantity *= self.volatility_scale(vol);
            }
        }

        let quantity = if self.params.allow_fractional {
            quantity.round_dp_with_strategy(FRACTIONAL_DP, RoundingStrategy::ToZero)
        } else {
            quantity.floor()
        };
        quantity.max(Decimal::ZERO)
    }

    fn volatility_scale(&self, volatility: Decimal) -> Decimal {
        match volatility {
            v if v > self.params.high_volatility_threshold => dec!(0.7),
            v if v > self.params.medium_volatility_threshold => dec!(0.85),
            _ => Decimal::ONE,
        }
    }

    fn order<S: TradingSignal>(&self, signal: &S, quantity: Decimal) -> Order {
        Order::market(signal.symbol(), OrderSide::Buy, quantity)
            .with_strategy(self.strategy)
            .with_reason(signal.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Position, Signal};
    use proptest::prelude::*;
    use std::collections::HashMap;

    struct Cash(Decimal);

    impl PortfolioView for Cash {
        fn cash(&self) -> Decimal {
            self.0
        }
        fn total_value(&self) -> Decimal {
            self.0
        }
        fn position(&self, _symbol: &str) -> Option<&Position> {
            None
        }
        fn positions(&self) -> Vec<&Position> {
            Vec::new()
        }
    }

    struct FixedVolatility(HashMap<String, Decimal>);

    impl VolatilitySource for FixedVolatility {
        fn volatility(&self, symbol: &str) -> Option<Decimal> {
            self.0.get(symbol).copied()
        }
    }

    fn allocator(method: AllocationMethod) -> CapitalAllocator {
        CapitalAllocator::new(AllocationConfig {
            method,
            ..AllocationConfig::default()
        })
        .unwrap()
    }

    fn signal(symbol: &str, price: Decimal, confidence: Decimal, priority: Decimal) -> Signal {
        Signal::new(symbol, price, "test_signal")
            .with_confidence(confidence)
            .with_priority(priority)
    }

    #[test]
    fn refuses_to_allocate_at_the_cash_buffer() {
        let signals = vec![signal("AAPL", dec!(10), dec!(1), dec!(1))];
        for method in [
            AllocationMethod::Equal,
            AllocationMethod::Confidence,
            AllocationMethod::Priority,
            AllocationMethod::Sequential,
        ] {
            let orders = allocator(method).allocate(&signals, &Cash(dec!(100)), "s", None);
            assert!(orders.is_empty());
        }
    }

    #[test]
    fn sequential_funds_best_confidence_first() {
        let signals = vec![
            signal("LOW", dec!(10), dec!(0.2), dec!(1)),
            signal("HIGH", dec!(10), dec!(0.9), dec!(1)),
        ];
        let orders = allocator(AllocationMethod::Sequential).allocate(&signals, &Cash(dec!(10000)), "s", None);

        // tradable = 9800; HIGH gets 95 % of it, LOW gets the rest.
        assert_eq!(orders[0].symbol, "HIGH");
        assert_eq!(orders[0].quantity, dec!(931));
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].strategy, "s");
        assert_eq!(orders[0].reason, "test_signal");
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].symbol, "LOW");
        // remaining 490, fraction 490/9800 = 0.05, allocation 24.5
        assert_eq!(orders[1].quantity, dec!(2));
    }

    #[test]
    fn priority_ranking_breaks_ties_on_confidence() {
        let signals = vec![
            signal("A", dec!(10), dec!(0.5), dec!(1)),
            signal("B", dec!(10), dec!(0.9), dec!(1)),
            signal("C", dec!(10), dec!(0.1), dec!(5)),
        ];
        let allocator = CapitalAllocator::new(AllocationConfig {
            method: AllocationMethod::Priority,
            max_positions: 2,
            ..AllocationConfig::default()
        })
        .unwrap();
        let orders = allocator.allocate(&signals, &Cash(dec!(10000)), "s", None);
        let symbols: Vec<_> = orders.iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["C", "B"]);
    }

    #[test]
    fn equal_split() {
        let signals = vec![
            signal("A", dec!(10), dec!(1), dec!(1)),
            signal("B", dec!(20), dec!(1), dec!(1)),
        ];
        let orders = allocator(AllocationMethod::Equal).allocate(&signals, &Cash(dec!(10000)), "s", None);
        // 9800 * 0.95 / 2 = 4655 each
        assert_eq!(orders[0].quantity, dec!(465));
        assert_eq!(orders[1].quantity, dec!(232));
    }

    #[test]
    fn confidence_weighting_gives_residue_to_last() {
        let signals = vec![
            signal("A", dec!(1), dec!(0.75), dec!(1)),
            signal("B", dec!(1), dec!(0.25), dec!(1)),
        ];
        let orders = allocator(AllocationMethod::Confidence).allocate(&signals, &Cash(dec!(10000)), "s", None);
        // budget 9310: A gets 6982.5 -> 6982 shares; B gets the 2328 left.
        assert_eq!(orders[0].quantity, dec!(6982));
        assert_eq!(orders[1].quantity, dec!(2328));
    }

    #[test]
    fn zero_confidence_falls_back_to_equal() {
        let signals = vec![
            signal("A", dec!(10), dec!(0), dec!(1)),
            signal("B", dec!(10), dec!(0), dec!(1)),
        ];
        let orders = allocator(AllocationMethod::Confidence).allocate(&signals, &Cash(dec!(10000)), "s", None);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].quantity, dec!(465));
    }

    #[test]
    fn volatility_scales_quantity_down() {
        let signals = vec![
            signal("CALM", dec!(10), dec!(1), dec!(1)),
            signal("WILD", dec!(10), dec!(1), dec!(1)),
        ];
        let allocator = CapitalAllocator::new(AllocationConfig {
            method: AllocationMethod::Equal,
            volatility_adjust: true,
            ..AllocationConfig::default()
        })
        .unwrap();
        let vol = FixedVolatility(HashMap::from([
            ("CALM".to_string(), dec!(0.025)),
            ("WILD".to_string(), dec!(0.05)),
        ]));
        let orders = allocator.allocate(&signals, &Cash(dec!(10000)), "s", Some(&vol));
        // 465.5 shares before scaling
        assert_eq!(orders[0].quantity, dec!(395));
        assert_eq!(orders[1].quantity, dec!(325));
    }

    #[test]
    fn fractional_shares() {
        let signals = vec![signal("BRK", dec!(300000), dec!(1), dec!(1))];
        let whole = allocator(AllocationMethod::Sequential).allocate(&signals, &Cash(dec!(10000)), "s", None);
        assert!(whole.is_empty());

        let allocator = CapitalAllocator::new(AllocationConfig {
            allow_fractional: true,
            ..AllocationConfig::default()
        })
        .unwrap();
        let orders = allocator.allocate(&signals, &Cash(dec!(10000)), "s", None);
        assert_eq!(orders.len(), 1);
        assert!(orders[0].quantity > Decimal::ZERO && orders[0].quantity < Decimal::ONE);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let err = CapitalAllocator::new(AllocationConfig {
            position_size: dec!(1.5),
            ..AllocationConfig::default()
        });
        assert!(matches!(err, Err(RiskError::InvalidParameters(_))));
    }

    fn arb_method() -> impl Strategy<Value = AllocationMethod> {
        prop_oneof![
            Just(AllocationMethod::Equal),
            Just(AllocationMethod::Confidence),
            Just(AllocationMethod::Priority),
            Just(AllocationMethod::Sequential),
        ]
    }

    proptest! {
        #[test]
        fn notional_never_exceeds_tradable_cash(
            method in arb_method(),
            cash in 0u32..200_000,
            fractional in any::<bool>(),
            raw in prop::collection::vec((1u32..5000, 0u32..=100, 0u32..10), 1..8),
        ) {
            let params = AllocationConfig {
                method,
                max_positions: 0,
                allow_fractional: fractional,
                ..AllocationConfig::default()
            };
            let allocator = CapitalAllocator::new(params.clone()).unwrap();
            let signals: Vec<Signal> = raw
                .iter()
                .enumerate()
                .map(|(i, (price, conf, prio))| {
                    signal(
                        &format!("S{i}"),
                        Decimal::from(*price),
                        Decimal::from(*conf) / dec!(100),
                        Decimal::from(*prio),
                    )
                })
                .collect();
            let cash = Decimal::from(cash);

            let orders = allocator.allocate(&signals, &Cash(cash), "s", None);
            let prices: HashMap<&str, Decimal> =
                signals.iter().map(|s| (s.symbol.as_str(), s.price)).collect();
            let notional: Decimal = orders.iter().map(|o| o.quantity * prices[o.symbol.as_str()]).sum();

            prop_assert!(notional <= cash * (Decimal::ONE - params.slippage_buffer));
            prop_assert!(orders.iter().all(|o| o.quantity > Decimal::ZERO));
            if cash <= params.min_cash_buffer {
                prop_assert!(orders.is_empty());
            }
        }
    }
}
