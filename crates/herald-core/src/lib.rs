//! # Herald Core
//! Shared error type, configuration, and the traits that connect the
//! scheduler to delivery channels and the tool layer.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
pub use traits::{DeliveryPort, Tool};
