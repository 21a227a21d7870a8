use crate::model::{Order, OrderStatus};
use rule_engine::{
    BoxError, Rule, RuleConfig, RuleCore, RuleError, RuleKey, RuleResult, RunContext,
};

/// First rule of the synchronous pipeline. A rejected order terminates the
/// run so no later rule prices or reserves anything.
pub struct ValidateOrder {
    core: RuleCore<Order>,
}

impl ValidateOrder {
    pub fn new() -> Self {
        Self {
            core: RuleCore::new().with_config(RuleConfig::new().order(1)),
        }
    }
}

impl Default for ValidateOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule<Order> for ValidateOrder {
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
        if order.quantity == 0 || order.unit_price <= 0.0 {
            order.status = OrderStatus::Rejected;
            order.record("rejected: invalid quantity or price");
            self.core.config.terminate = Some(true);
            return Ok(RuleResult::new()
                .with_error(RuleError::message("order failed validation")));
        }
        order.status = OrderStatus::Validated;
        order.record("validated");
        Ok(RuleResult::new())
    }
}
