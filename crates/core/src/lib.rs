//! `sawit-core`: domain building blocks for the TBS trading core.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod actor;
pub mod aggregate;
pub mod entity;
pub mod error;
pub mod grade;
pub mod id;
pub mod value_object;

pub use actor::{Actor, Role};
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use grade::Grade;
pub use id::{AggregateId, UserId};
pub use value_object::ValueObject;
