//! Stock ledger: harvested lots and their available quantity.
//!
//! Every reservation made by a purchase order and every release caused by a
//! cancellation or rejection goes through [`StockLot`], which keeps
//! `0 <= available_kg <= total_kg` at all times.

pub mod lot;

pub use lot::*;
