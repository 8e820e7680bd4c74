//! Purchase orders and the status machine that governs them.

pub mod numbering;
pub mod order;

pub use numbering::daily_number;
pub use order::*;
