//! Contribution Ledger Storage
//!
//! PostgreSQL persistence for contribution rows, plus an in-memory ledger
//! used when PostgreSQL is disabled and by the test suite.

pub mod contributions;
pub mod memory;
pub mod pool;

pub use contributions::{PgLedger, PgLedgerTx};
pub use memory::{MemoryLedger, MemoryLedgerTx};
pub use pool::DatabasePool;
