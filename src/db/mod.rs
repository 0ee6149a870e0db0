//! Database abstraction layer.
//!
//! This module provides the stored-procedure execution core:
//! - Process-wide connection pool management
//! - Parameter mapping and per-backend binding
//! - Routine execution with result-shape negotiation
//! - Explicit transaction lifecycle (begin/commit/rollback)
//! - Row-to-JSON type mappings

pub mod executor;
pub mod params;
pub mod pool;
pub mod transaction;
pub mod types;

pub use executor::{ProcExecutor, ProcOutcome, ResultShape};
pub use params::{ParamMap, ProcParam};
pub use pool::DbPool;
pub use transaction::ProcTransaction;
pub use types::{ProcRow, RecordSet};
