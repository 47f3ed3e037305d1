//! Demo domain model: user accounts and their change history.

pub mod user;
