use rule_engine::{RuleEngine, RuleResultsExt};
use rule_sample::model::{Order, OrderStatus};
use rule_sample::rules::{
    AuditTrail, ComputeTotal, FraudScreen, InventoryShortfall, NotifyCustomer, ReserveInventory,
    RiskGate, ValidateOrder, VolumeDiscount,
};

fn pricing_engine(order: Order) -> RuleEngine<Order> {
    let mut engine = RuleEngine::new(order);
    engine.add_rule(ValidateOrder::new());
    engine.add_rule(ComputeTotal::new());
    engine.add_rule(VolumeDiscount::new());
    engine.add_rule(AuditTrail::new());
    engine.add_rule(ReserveInventory::new());
    engine.add_rule(InventoryShortfall::new());
    engine
}

fn names(results: &[rule_engine::RuleResult]) -> Vec<&str> {
    results.iter().filter_map(|r| r.name.as_deref()).collect()
}

#[test]
fn a_small_order_is_priced_without_discount() {
    let mut engine = pricing_engine(Order::new("ord-1", "Alice", 5, 10.0));
    let results = engine.execute().unwrap();

    assert_eq!(
        names(&results),
        ["ValidateOrder", "ComputeTotal", "AuditTrail", "ReserveInventory"]
    );
    let order = engine.model().unwrap();
    assert_eq!(order.status, OrderStatus::Priced);
    assert_eq!(order.discount, 0.0);
    assert_eq!(order.total, 50.0);
    assert!(order.audit.iter().any(|e| e == "validated"));
    assert!(order.audit.iter().any(|e| e.starts_with("priced at")));
}

#[test]
fn a_volume_order_is_discounted_just_before_pricing() {
    let mut engine = pricing_engine(Order::new("ord-2", "Bob", 12, 10.0));
    let results = engine.execute().unwrap();

    assert_eq!(
        names(&results),
        [
            "ValidateOrder",
            "VolumeDiscount",
            "ComputeTotal",
            "AuditTrail",
            "ReserveInventory"
        ]
    );
    let order = engine.model().unwrap();
    assert_eq!(order.discount, VolumeDiscount::RATE);
    assert!((order.total - 108.0).abs() < 1e-9);
}

#[test]
fn an_invalid_order_is_rejected_and_terminates_the_run() {
    let mut engine = pricing_engine(Order::new("ord-3", "Mallory", 0, 10.0));
    let results = engine.execute().unwrap();

    assert_eq!(names(&results), ["ValidateOrder"]);
    assert!(results.any_error());
    let order = engine.model().unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.total, 0.0);
}

#[test]
fn an_inventory_shortfall_holds_the_order_instead_of_aborting() {
    let mut engine = pricing_engine(Order::new("ord-4", "Carol", 150, 10.0));
    let results = engine.execute().unwrap();

    let order = engine.model().unwrap();
    assert_eq!(order.status, OrderStatus::Held);
    assert!(results.find_result("ReserveInventory").is_none());

    let held = results.find_result("InventoryShortfall").unwrap();
    let captured = held.error.as_ref().and_then(|e| e.source.as_ref()).unwrap();
    assert!(captured.to_string().contains("insufficient stock"));
}

fn screening_engine(order: Order) -> RuleEngine<Order> {
    let mut engine = RuleEngine::new(order);
    engine.add_async_rule(FraudScreen::new());
    engine.add_async_rule(RiskGate::new());
    engine.add_async_rule(NotifyCustomer::new());
    engine
}

#[tokio::test]
async fn a_cheap_order_clears_fraud_screening() {
    let mut engine = screening_engine(Order::new("ord-5", "Dave", 2, 10.0));
    let results = engine.execute_async().await.unwrap();

    // ordered pass first (gate, then its reactive notifier), scorer joined last
    assert_eq!(names(&results), ["RiskGate", "NotifyCustomer", "FraudScreen"]);
    let order = engine.model().unwrap();
    assert_ne!(order.status, OrderStatus::Held);
    assert!(order.audit.iter().any(|e| e.starts_with("cleared")));
    assert!(order
        .audit
        .iter()
        .any(|e| e.contains("order confirmed")));
}

#[tokio::test]
async fn a_big_ticket_order_is_held_for_review() {
    let mut engine = screening_engine(Order::new("ord-6", "Eve", 100, 99.0));
    engine.execute_async().await.unwrap();

    let order = engine.model().unwrap();
    assert_eq!(order.status, OrderStatus::Held);
    assert!(order.audit.iter().any(|e| e.starts_with("held: fraud score")));
    assert!(order
        .audit
        .iter()
        .any(|e| e.contains("order under review")));
}
