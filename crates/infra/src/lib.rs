//! Infrastructure layer: persistence, configuration and the fulfillment
//! service that coordinates the domain aggregates inside a unit of work.

pub mod clock;
pub mod config;
pub mod fulfillment;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use fulfillment::{
    AdminStats, BuyerStats, DailySales, DashboardStats, FulfillmentError, FulfillmentService,
    NewLot, NewOrder, NewPayment, OutboundReading, ServiceSettings, Settled,
};
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, UnitOfWork};
