use crate::model::{Order, OrderStatus};
use async_trait::async_trait;
use rule_engine::{
    AsyncRule, AsyncRuleCore, BoxError, ParallelConfig, RuleKey, RuleResult, RunContext,
    SharedModel,
};
use std::time::Duration;

const SCORE_KEY: &str = "fraud.score";
const HOLD_THRESHOLD: f64 = 0.8;

/// Parallel fraud scorer. Runs on its own task while the ordered pass
/// proceeds; the score lands in the shared store for [`RiskGate`].
pub struct FraudScreen {
    core: AsyncRuleCore<Order>,
}

impl FraudScreen {
    pub fn new() -> Self {
        Self {
            core: AsyncRuleCore::new().parallel(ParallelConfig::new()),
        }
    }

    /// Stand-in for a scoring service call: big-ticket orders from unknown
    /// customers score high.
    fn score(order: &Order) -> f64 {
        let exposure = f64::from(order.quantity) * order.unit_price;
        (exposure / 10_000.0).min(1.0)
    }
}

impl Default for FraudScreen {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncRule<Order> for FraudScreen {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &AsyncRuleCore<Order> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AsyncRuleCore<Order> {
        &mut self.core
    }

    async fn invoke(
        &mut self,
        model: &SharedModel<Order>,
        ctx: &RunContext,
    ) -> Result<RuleResult, BoxError> {
        let score = {
            let order = model.read().await;
            Self::score(&order)
        };
        // simulated round-trip to the scoring service
        tokio::time::sleep(Duration::from_millis(25)).await;
        ctx.store().put(SCORE_KEY, score);
        Ok(RuleResult::new().with_value(score))
    }
}

/// Waits for the fraud score and holds anything above the threshold. A
/// scorer that never reports is treated as suspicious, not as a run
/// failure.
pub struct RiskGate {
    core: AsyncRuleCore<Order>,
}

impl RiskGate {
    pub fn new() -> Self {
        Self {
            core: AsyncRuleCore::new(),
        }
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncRule<Order> for RiskGate {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &AsyncRuleCore<Order> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AsyncRuleCore<Order> {
        &mut self.core
    }

    async fn invoke(
        &mut self,
        model: &SharedModel<Order>,
        ctx: &RunContext,
    ) -> Result<RuleResult, BoxError> {
        let score = match ctx.store().get(SCORE_KEY, Duration::from_secs(2)).await {
            Ok(value) => value
                .downcast::<f64>()
                .map(|s| *s)
                .map_err(|_| "fraud score has the wrong type")?,
            Err(_) => 1.0,
        };

        let mut order = model.write().await;
        if score > HOLD_THRESHOLD {
            order.status = OrderStatus::Held;
            order.record(format!("held: fraud score {score:.2}"));
        } else {
            order.record(format!("cleared: fraud score {score:.2}"));
        }
        Ok(RuleResult::new().with_value(score))
    }
}

/// Reactive on [`RiskGate`]: tells the customer what happened to the order.
pub struct NotifyCustomer {
    core: AsyncRuleCore<Order>,
}

impl NotifyCustomer {
    pub fn new() -> Self {
        Self {
            core: AsyncRuleCore::new().reactive_to(RuleKey::of::<RiskGate>()),
        }
    }
}

impl Default for NotifyCustomer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncRule<Order> for NotifyCustomer {
    fn key(&self) -> RuleKey {
        RuleKey::of::<Self>()
    }

    fn core(&self) -> &AsyncRuleCore<Order> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AsyncRuleCore<Order> {
        &mut self.core
    }

    async fn invoke(
        &mut self,
        model: &SharedModel<Order>,
        _ctx: &RunContext,
    ) -> Result<RuleResult, BoxError> {
        let mut order = model.write().await;
        let note = match order.status {
            OrderStatus::Held => format!("notified {}: order under review", order.customer),
            _ => format!("notified {}: order confirmed", order.customer),
        };
        order.record(note);
        Ok(RuleResult::new())
    }
}
