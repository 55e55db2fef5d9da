//! HTTP handlers for the prescription service.

pub mod drugs;
pub mod health;

pub use drugs::get_drugs;
pub use health::health_check;
