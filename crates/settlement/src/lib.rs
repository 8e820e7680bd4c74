//! Settlement: pricing a completed weighing into a sales document, and the
//! payments made against that document.

pub mod calculator;
pub mod document;
pub mod payment;

pub use calculator::{GradePenaltyTable, Settlement, settle};
pub use document::*;
pub use payment::*;
