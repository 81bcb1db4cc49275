//! PostgreSQL Database Module
//!
//! Write-through durability mirror for nodes, enforcement events, and risk
//! state. The in-memory engines are authoritative at runtime.

pub mod pool;
pub mod nodes;
pub mod events;
pub mod risk;

pub use pool::DatabasePool;
pub use nodes::NodeRepository;
pub use events::EventRepository;
pub use risk::RiskRepository;
