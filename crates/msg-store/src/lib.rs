//! Message and history stores
//!
//! The message store holds one row per in-flight delivery chain. The history
//! store is an append-only ledger of terminal outcomes. Both live behind one
//! repository so a terminal transition is a single atomic unit.

pub mod error;
pub mod memory;
pub mod repository;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::{Result, StoreError};
pub use memory::InMemoryDeliveryRepository;
pub use repository::DeliveryRepository;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDeliveryRepository;
