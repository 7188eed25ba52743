//! Database adapters
//!
//! Two backend families sit behind this module:
//!
//! - [`MariaBackend`]: the relational adapter. It talks to MySQL/MariaDB
//!   through the [`SqlDriver`]/[`SqlConnection`] seam, builds statements with
//!   [`crate::query::SqlQuery`] and owns the transaction lifecycle.
//! - [`MongoBackend`] (feature `mongodb`): the document adapter. It shares
//!   one client per URL and hands out lazy cursors.
//!
//! The driver seam exists so the mapper layer and the tests never depend on
//! a live server: tests substitute an in-memory fake driver.

pub mod driver;
pub mod maria;
#[cfg(feature = "mongodb")]
pub mod mongo;

pub use driver::{SqlConnection, SqlDriver};
#[cfg(feature = "mysql")]
pub use driver::MysqlDriver;
pub use maria::{MariaBackend, SqlOutput};
#[cfg(feature = "mongodb")]
pub use mongo::{DocFilter, MongoBackend};
