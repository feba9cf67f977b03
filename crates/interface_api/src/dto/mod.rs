//! Request and response bodies
//!
//! Bodies use camelCase keys. Requests are validated with `validator`
//! before they reach the service.

pub mod bonus;
pub mod definition;
pub mod history;

pub use bonus::*;
pub use definition::*;
pub use history::*;
