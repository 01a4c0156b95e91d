//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the payment reconciliation core, built on SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern:
//! - `repositories` hold the SQL and the row types, and own transactions
//! - `adapters` implement the domain ports (`InvoiceLedger`, `PaymentStore`)
//!   on top of a repository and translate rows into domain types
//!
//! # Concurrency
//!
//! Every write to `payment_orders` is guarded by the `version` column the
//! writer read. A write that matches no row at that version is reported as a
//! conflict, and the domain re-reads the order to decide what happened.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresPaymentAdapter};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/payments")).await?;
//! run_migrations(&pool).await?;
//! let adapter = PostgresPaymentAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use repositories::PaymentRepository;
pub use adapters::PostgresPaymentAdapter;
