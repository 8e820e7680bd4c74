//! Record storage for lots, orders, weighing sessions, sales documents and
//! payments, with transactional units of work.

pub mod filter;
pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use filter::{DocumentFilter, LotFilter, OrderFilter, PaymentFilter, SessionFilter};
pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{SequenceKey, SequenceKind, Store, StoreError, UnitOfWork};
