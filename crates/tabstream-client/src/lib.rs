//! # tabstream-client
//!
//! Session layer of the tabstream driver: the request state machine and
//! the streaming bulk-load engine.
//!
//! ## Bulk loads
//!
//! ```rust,ignore
//! use tabstream_client::{BulkLoad, BulkLoadOptions, ColumnOptions, Session, rows};
//! use tabstream_types::{SqlType, SqlValue};
//!
//! let mut session = Session::new(transport, config);
//!
//! let mut bulk = BulkLoad::new("[dbo].[events]", BulkLoadOptions::default())?;
//! bulk.add_column("id", SqlType::Int, ColumnOptions::default())?;
//! bulk.add_column("name", SqlType::NVarChar { length: VarLen::Limited(50) },
//!     ColumnOptions { nullable: true, obj_name: None })?;
//!
//! let source = rows(vec![
//!     vec![SqlValue::Int(1), SqlValue::String("a".into())],
//!     vec![SqlValue::Int(2), SqlValue::String("b".into())],
//! ]);
//!
//! let count = session.execute_bulk_load(&mut bulk, source).await?;
//! assert_eq!(count, 2);
//! ```
//!
//! Cancellation is cooperative: a [`BulkLoadHandle`] can be cloned into
//! another task; the engine checks it between rows and between tokens,
//! sends the Attention signal, and settles with a cancellation error
//! once the server acknowledges.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bulk;
pub mod config;
pub mod error;
pub mod rows;
pub mod session;
pub mod state;

pub use bulk::{BulkColumn, BulkLoad, BulkLoadHandle, BulkLoadOptions, BulkLoadPhase, ColumnOptions};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use rows::{BulkRow, IntoBulkRow, RowSource, row_stream, rows, try_rows};
pub use session::Session;
pub use state::SessionState;
