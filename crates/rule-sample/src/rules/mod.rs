//! Hand-written rules for the order pipeline.
//!
//! The synchronous set validates and prices an order; the asynchronous set
//! screens it for fraud, with the scoring rule running in parallel to the
//! rest of the pass.

pub mod inventory;
pub mod pricing;
pub mod screening;
pub mod validation;

pub use inventory::{InventoryShortfall, ReserveInventory, StockShortage};
pub use pricing::{AuditTrail, ComputeTotal, VolumeDiscount};
pub use screening::{FraudScreen, NotifyCustomer, RiskGate};
pub use validation::ValidateOrder;
