use crate::model::{Order, OrderStatus};
use rule_engine::{BoxError, Rule, RuleConfig, RuleCore, RuleKey, RuleResult, RunContext};

/// Preactive on [`ComputeTotal`]: large orders get 10 % off just before the
/// total is computed. The constraint keeps small orders untouched.
pub struct VolumeDiscount {
    core: RuleCore<Order>,
}

impl VolumeDiscount {
    pub const THRESHOLD: u32 = 10;
    pub const RATE: f64 = 0.10;

    pub fn new() -> Self {
        Self {
            core: RuleCore::new()
                .preactive_to(RuleKey::of::<ComputeTotal>())
                .with_config(RuleConfig::new().constrain(|o: &Order| o.quantity >= Self::THRESHOLD)),
        }
    }
}

impl Default for VolumeDiscount {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule<Order> for VolumeDiscount {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &RuleCore<Order> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuleCore<Order> {
        &mut self.core
    }

    fn invoke(&mut self, order: &mut Order, _ctx: &RunContext) -> Result<RuleResult, BoxError> {
        order.discount = Self::RATE;
        order.record(format!("volume discount of {:.0} % applied", Self::RATE * 100.0));
        Ok(RuleResult::new().with_value(Self::RATE))
    }
}

/// Prices the order from quantity, unit price and whatever discount the
/// preactive rules left behind.
pub struct ComputeTotal {
    core: RuleCore<Order>,
}

impl ComputeTotal {
    pub fn new() -> Self {
        Self {
            core: RuleCore::new().with_config(RuleConfig::new().order(2)),
        }
    }
}

impl Default for ComputeTotal {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule<Order> for ComputeTotal {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &RuleCore<Order> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuleCore<Order> {
        &mut self.core
    }

    fn invoke(&mut self, order: &mut Order, _ctx: &RunContext) -> Result<RuleResult, BoxError> {
        order.total = f64::from(order.quantity) * order.unit_price * (1.0 - order.discount);
        order.status = OrderStatus::Priced;
        Ok(RuleResult::new().with_value(order.total))
    }
}

/// Reactive on [`ComputeTotal`]: writes the priced amount to the audit
/// trail once the total is known.
pub struct AuditTrail {
    core: RuleCore<Order>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self {
            core: RuleCore::new().reactive_to(RuleKey::of::<ComputeTotal>()),
        }
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule<Order> for AuditTrail {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &RuleCore<Order> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RuleCore<Order> {
        &mut self.core
    }

    fn invoke(&mut self, order: &mut Order, _ctx: &RunContext) -> Result<RuleResult, BoxError> {
        order.record(format!("priced at {:.2}", order.total));
        Ok(RuleResult::new())
    }
}
