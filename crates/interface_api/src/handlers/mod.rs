//! Request handlers

pub mod bonus;
pub mod health;
