//! # clinrec-core
//!
//! Core crate for the clinical recommendation job queue. Contains the
//! unified error system, configuration schemas, and the clock abstraction
//! every timestamp in the queue is taken from.
//!
//! This crate has **no** internal dependencies on other ClinRec crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
