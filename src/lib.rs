//! Stored-Procedure Gateway Library
//!
//! A data-access abstraction between an HTTP request layer and a relational
//! database reached exclusively through stored procedures: validate untrusted
//! request input into typed parameters, execute named routines against a
//! shared pool or an explicit transaction, and shape heterogeneous result
//! sets into one uniform return value.

pub mod config;
pub mod crud;
pub mod db;
pub mod error;
pub mod http;

pub use config::Config;
pub use crud::credential::{Credential, CredentialResolver, PlaceholderResolver};
pub use crud::shape::{JsonShape, Shape};
pub use crud::{CrudController, CrudPermission, Operation, RawRequest, ValidatedRequest};
pub use db::executor::{ProcExecutor, ProcOutcome, ResultShape};
pub use db::params::{ParamMap, ProcParam};
pub use db::transaction::ProcTransaction;
pub use error::{ApiError, ApiResult, FieldError};
