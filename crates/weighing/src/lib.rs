//! Truck weighing at pickup: loading schedule, weigh-in and weigh-out.

pub mod session;

pub use session::*;
