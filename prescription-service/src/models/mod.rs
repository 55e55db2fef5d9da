//! Domain models for the prescription service.

pub mod prescription;

pub use prescription::{Medicine, Prescription};
