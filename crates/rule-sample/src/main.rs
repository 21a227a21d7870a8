//! # Order Pipeline Demo
//!
//! Drives one order through the synchronous validation/pricing pipeline and
//! then through the asynchronous fraud-screening pass, logging what each
//! stage did. Run with `RUST_LOG=info` (or `rule_engine=debug` to watch
//! every lifecycle phase).

use rule_engine::tracing::setup_tracing;
use rule_engine::{RuleEngine, RuleResultsExt, TracingRuleLogger};
use rule_sample::model::Order;
use rule_sample::rules::{
    AuditTrail, ComputeTotal, FraudScreen, InventoryShortfall, NotifyCustomer, ReserveInventory,
    RiskGate, ValidateOrder, VolumeDiscount,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let order = Order::new("ord-1001", "Alice", 12, 49.95);
    info!(order = %order.id, quantity = order.quantity, "processing order");

    let mut engine = RuleEngine::new(order);
    engine.set_logger(TracingRuleLogger);

    // Synchronous pass: validate, price, reserve.
    engine.add_rule(ValidateOrder::new());
    engine.add_rule(ComputeTotal::new());
    engine.add_rule(VolumeDiscount::new());
    engine.add_rule(AuditTrail::new());
    engine.add_rule(ReserveInventory::new());
    engine.add_rule(InventoryShortfall::new());

    let results = engine.execute()?;
    info!(results = results.len(), "pricing pass finished");
    for flagged in results.errors() {
        warn!(rule = flagged.name.as_deref().unwrap_or(""), "rule reported a problem");
    }

    // Asynchronous pass: fraud screening with a parallel scorer.
    engine.add_async_rule(FraudScreen::new());
    engine.add_async_rule(RiskGate::new());
    engine.add_async_rule(NotifyCustomer::new());

    let results = engine.execute_async().await?;
    info!(results = results.len(), "screening pass finished");

    if let Some(order) = engine.model() {
        info!(
            order = %order.id,
            status = ?order.status,
            total = order.total,
            "pipeline complete"
        );
        for entry in &order.audit {
            info!(entry = %entry, "audit");
        }
    }

    Ok(())
}
