//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! payment core test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for common entities
//! - `builders`: Builder patterns for invoices and orders
//! - `harness`: A `PaymentService` wired to in-memory and mock collaborators
//! - `database`: Database test helpers and container management
//! - `assertions`: Custom assertion helpers for domain types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod harness;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use harness::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
