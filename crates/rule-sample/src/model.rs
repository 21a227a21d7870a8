//! Order domain model the sample rules operate on.

use serde::{Deserialize, Serialize};

/// Processing state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Draft,
    Validated,
    Priced,
    Rejected,
    /// Held back for manual review, e.g. after a failed inventory
    /// reservation or a high fraud score.
    Held,
}

/// An order flowing through the rule pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub customer: String,
    pub quantity: u32,
    pub unit_price: f64,
    /// Fractional discount, e.g. `0.1` for 10 % off.
    pub discount: f64,
    pub total: f64,
    pub status: OrderStatus,
    /// Trail of what the rules did to this order.
    pub audit: Vec<String>,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        customer: impl Into<String>,
        quantity: u32,
        unit_price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            customer: customer.into(),
            quantity,
            unit_price,
            discount: 0.0,
            total: 0.0,
            status: OrderStatus::Draft,
            audit: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: impl Into<String>) {
        self.audit.push(entry.into());
    }
}
