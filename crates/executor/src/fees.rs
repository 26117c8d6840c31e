use configuration::{CommissionConfig, Simulation};
use core_types::OrderSide;
use rust_decimal::Decimal;

/// The three fee components charged on a single fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeBreakdown {
    pub commission: Decimal,
    pub regulatory_fee: Decimal,
    pub activity_fee: Decimal,
}

impl FeeBreakdown {
    pub fn total(&self) -> Decimal {
        self.commission + self.regulatory_fee + self.activity_fee
    }
}

/// The fee model shared by the broker (to charge fills) and the ledger (to
/// estimate affordability before an order is sent).
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    commission: CommissionConfig,
    regulatory_fee_rate: Decimal,
    activity_fee_per_share: Decimal,
    activity_fee_cap: Decimal,
}

impl FeeSchedule {
    pub fn new(params: &Simulation) -> Self {
        Self {
            commission: params.commission.clone(),
            regulatory_fee_rate: params.regulatory_fee_rate,
            activity_fee_per_share: params.activity_fee_per_share,
            activity_fee_cap: params.activity_fee_cap,
        }
    }

    /// A schedule that charges nothing.
    pub fn zero() -> Self {
        Self {
            commission: CommissionConfig {
                model: configuration::CommissionModel::Fixed,
                rate: Decimal::ZERO,
            },
            regulatory_fee_rate: Decimal::ZERO,
            activity_fee_per_share: Decimal::ZERO,
            activity_fee_cap: Decimal::ZERO,
        }
    }

    pub fn commission(&self, notional: Decimal) -> Decimal {
        self.commission.calculate(notional)
    }

    /// Levied on sells only.
    pub fn regulatory_fee(&self, side: OrderSide, notional: Decimal) -> Decimal {
        match side {
            OrderSide::Sell => notional * self.regulatory_fee_rate,
            OrderSide::Buy => Decimal::ZERO,
        }
    }

    /// Per share on both sides, capped per trade.
    pub fn activity_fee(&self, quantity: Decimal) -> Decimal {
        (quantity * self.activity_fee_per_share).min(self.activity_fee_cap)
    }

    pub fn calculate(&self, side: OrderSide, quantity: Decimal, price: Decimal) -> FeeBreakdown {
        let notional = quantity * price;
        FeeBreakdown {
            commission: self.commission(notional),
            regulatory_fee: self.regulatory_fee(side, notional),
            activity_fee: self.activity_fee(quantity),
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(&Simulation::default())
    }
}
