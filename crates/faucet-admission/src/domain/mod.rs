//! # Domain Module
//!
//! Core domain types for faucet admission control.

pub mod address;
pub mod entities;
pub mod errors;
pub mod lifecycle;
pub mod value_objects;

pub use address::AddressFormat;
pub use entities::*;
pub use errors::*;
pub use lifecycle::{AdmissionLifecycle, AdmissionStage};
pub use value_objects::*;
