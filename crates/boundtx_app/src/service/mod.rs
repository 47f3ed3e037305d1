//! Use-case services over the DAOs.

pub mod user_service;
