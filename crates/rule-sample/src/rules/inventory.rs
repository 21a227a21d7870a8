use crate::model::{Order, OrderStatus};
use rule_engine::{
    BoxError, Rule, RuleConfig, RuleCore, RuleError, RuleKey, RuleResult, RunContext,
};

/// What the warehouse will hand out per order without a manual override.
const STOCK_CEILING: u32 = 100;

#[derive(Debug, thiserror::Error)]
#[error("insufficient stock for order {order_id}: {requested} requested")]
pub struct StockShortage {
    pub order_id: String,
    pub requested: u32,
}

/// Reserves stock after pricing. Fails the hard way when the warehouse
/// cannot cover the quantity — recovery is [`InventoryShortfall`]'s job.
pub struct ReserveInventory {
    core: RuleCore<Order>,
}

impl ReserveInventory {
    pub fn new() -> Self {
        Self {
            core: RuleCore::new().with_config(RuleConfig::new().order(3)),
        }
    }
}

impl Default for ReserveInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule<Order> for ReserveInventory {
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
        if order.quantity > STOCK_CEILING {
            return Err(Box::new(StockShortage {
                order_id: order.id.clone(),
                requested: order.quantity,
            }));
        }
        order.record(format!("reserved {} units", order.quantity));
        Ok(RuleResult::new())
    }
}

/// Exception handler observing [`ReserveInventory`]: a reservation failure
/// holds the order for manual review instead of aborting the run.
pub struct InventoryShortfall {
    core: RuleCore<Order>,
}

impl InventoryShortfall {
    pub fn new() -> Self {
        Self {
            core: RuleCore::new().on_failure_of(RuleKey::of::<ReserveInventory>()),
        }
    }
}

impl Default for InventoryShortfall {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule<Order> for InventoryShortfall {
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
        order.status = OrderStatus::Held;
        order.record("held: inventory shortfall");
        let error = match self.core.unhandled_error() {
            Some(source) => RuleError::from_source(source.clone()),
            None => RuleError::message("held without a captured failure"),
        };
        Ok(RuleResult::new().with_error(error))
    }
}
