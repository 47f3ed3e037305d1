//! Data-access objects over the demo schema.
//!
//! # Responsibility
//! - Keep SQL text and row mapping for each table in one place.
//! - Stay unaware of transactions: every call runs on whatever connection the
//!   execution context has bound, so callers decide the unit of work.

pub mod user_dao;
pub mod user_history_dao;
