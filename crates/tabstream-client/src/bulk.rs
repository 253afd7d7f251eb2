//! Bulk load configuration and wire composition.
//!
//! A [`BulkLoad`] is configured with a target table, options, and an
//! ordered column list, then executed once via
//! [`crate::Session::execute_bulk_load`]. This module owns the handle's
//! phase machine, option validation, the INSERT BULK statement and
//! CREATE TABLE DDL synthesis, and the outbound COLMETADATA header; the
//! streaming engine itself lives in the session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tabstream_protocol::{TokenType, TrackingBuffer};
use tabstream_types::SqlType;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::rows::BulkRow;

/// Options controlling a bulk load.
///
/// These map to the WITH hints of the INSERT BULK statement.
/// Unrecognised concerns have no representation here; `order` values
/// are validated fail-fast at handle construction.
#[derive(Debug, Clone, Default)]
pub struct BulkLoadOptions {
    /// Honour check constraints during the load. Default false.
    pub check_constraints: bool,
    /// Fire INSERT triggers on the target table. Default false.
    pub fire_triggers: bool,
    /// Keep NULL values instead of applying column defaults. Default
    /// false.
    pub keep_nulls: bool,
    /// Sort-order hint: column name to `"ASC"` or `"DESC"`. Default
    /// empty.
    pub order: BTreeMap<String, String>,
}

impl BulkLoadOptions {
    /// Validate the option surface before any I/O.
    pub fn validate(&self) -> Result<()> {
        for (key, direction) in &self.order {
            if direction != "ASC" && direction != "DESC" {
                return Err(Error::BulkInput(format!(
                    "The value of the \"{key}\" key in the \"options.order\" object must be either \"ASC\" or \"DESC\"."
                )));
            }
        }
        Ok(())
    }
}

/// Per-column options for [`BulkLoad::add_column`].
#[derive(Debug, Clone, Default)]
pub struct ColumnOptions {
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Name used on the wire and in generated SQL when it differs from
    /// the lookup name (e.g. bracketed or renamed target columns).
    pub obj_name: Option<String>,
}

/// A configured bulk-load column.
#[derive(Debug, Clone)]
pub struct BulkColumn {
    /// Lookup name, used to project keyed rows.
    pub name: String,
    /// Declared type.
    pub ty: SqlType,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Wire/SQL name.
    pub obj_name: String,
}

/// Lifecycle phase of a bulk-load handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkLoadPhase {
    /// Columns may be added; nothing is on the wire.
    Configuring,
    /// Execution has begun; the configuration is frozen.
    Executing,
    /// Settled by cancellation or timeout.
    Cancelled,
    /// Settled successfully.
    Completed,
    /// Settled by a validation, source, or server error.
    Errored,
}

/// A bulk-load operation handle.
///
/// Owned by one request at a time; the phase transition into
/// `Executing` is one-way and the completion (the `execute` result) is
/// delivered exactly once.
#[derive(Debug)]
pub struct BulkLoad {
    table: String,
    options: BulkLoadOptions,
    columns: Vec<BulkColumn>,
    phase: BulkLoadPhase,
    timeout: Option<Duration>,
    cancel: Arc<CancelFlag>,
}

#[derive(Debug, Default)]
pub(crate) struct CancelFlag {
    requested: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub(crate) async fn requested(&self) {
        while !self.is_requested() {
            self.notify.notified().await;
        }
    }
}

impl BulkLoad {
    /// Create a bulk-load handle for the given table.
    ///
    /// Option validation runs here, before any I/O.
    pub fn new(table: impl Into<String>, options: BulkLoadOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            table: table.into(),
            options,
            columns: Vec::new(),
            phase: BulkLoadPhase::Configuring,
            timeout: None,
            cancel: Arc::new(CancelFlag::default()),
        })
    }

    /// The target table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The configured columns, in order.
    #[must_use]
    pub fn columns(&self) -> &[BulkColumn] {
        &self.columns
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> BulkLoadPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: BulkLoadPhase) {
        self.phase = phase;
    }

    /// Append a column. Valid only before execution starts.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        ty: SqlType,
        options: ColumnOptions,
    ) -> Result<()> {
        if self.phase != BulkLoadPhase::Configuring {
            return Err(Error::BulkInput(
                "Columns cannot be added to bulk insert after execution has started.".into(),
            ));
        }

        let name = name.into();
        let obj_name = options.obj_name.unwrap_or_else(|| name.clone());
        self.columns.push(BulkColumn {
            name,
            ty,
            nullable: options.nullable,
            obj_name,
        });
        Ok(())
    }

    /// Arm a one-shot request timer, applied when execution starts.
    ///
    /// `None` disarms. A timer firing after completion is a no-op.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// The armed request timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Get a clonable handle that cancels this bulk load.
    #[must_use]
    pub fn handle(&self) -> BulkLoadHandle {
        BulkLoadHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Request cancellation.
    ///
    /// Before execution: the eventual `execute` call settles immediately
    /// with a cancellation error. During execution: the engine stops
    /// pulling rows, signals Attention, and settles once the server
    /// acknowledges. After completion: no-op. Idempotent.
    pub fn cancel(&self) {
        self.cancel.request();
    }

    pub(crate) fn cancel_flag(&self) -> Arc<CancelFlag> {
        Arc::clone(&self.cancel)
    }

    /// DDL creating a table matching the configured columns, usable for
    /// `#temp` staging tables.
    #[must_use]
    pub fn table_creation_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                format!(
                    "[{}] {} {}",
                    escape_bracket(&c.obj_name),
                    c.ty.declaration(),
                    if c.nullable { "NULL" } else { "NOT NULL" }
                )
            })
            .collect();

        format!("CREATE TABLE {} ({})", self.table, columns.join(", "))
    }

    /// The INSERT BULK statement that precedes the row stream.
    #[must_use]
    pub fn insert_bulk_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("[{}] {}", escape_bracket(&c.obj_name), c.ty.declaration()))
            .collect();

        let mut sql = format!("insert bulk {} ({})", self.table, columns.join(", "));

        let mut hints: Vec<String> = Vec::new();
        if self.options.check_constraints {
            hints.push("CHECK_CONSTRAINTS".into());
        }
        if self.options.fire_triggers {
            hints.push("FIRE_TRIGGERS".into());
        }
        if self.options.keep_nulls {
            hints.push("KEEP_NULLS".into());
        }
        if !self.options.order.is_empty() {
            let order: Vec<String> = self
                .options
                .order
                .iter()
                .map(|(col, dir)| format!("[{}] {dir}", escape_bracket(col)))
                .collect();
            hints.push(format!("ORDER({})", order.join(", ")));
        }

        if !hints.is_empty() {
            sql.push_str(&format!(" with ({})", hints.join(", ")));
        }

        sql
    }

    /// Write the COLMETADATA token describing the configured columns.
    ///
    /// The layout mirrors the inbound metadata decoder's format, so the
    /// header this emits reads back through `ColMetaData::decode`.
    pub(crate) fn encode_colmetadata(&self, buf: &mut TrackingBuffer) {
        buf.write_u8(TokenType::ColMetaData as u8);
        buf.write_u16_le(self.columns.len() as u16);

        for col in &self.columns {
            buf.write_u32_le(0); // user type
            buf.write_u16_le(if col.nullable { 0x0001 } else { 0x0000 });
            col.ty.encode_type_info(buf);
            buf.write_b_varchar(&col.obj_name);
        }
    }

    /// Project a row onto the configured column order.
    ///
    /// Tuples are taken positionally and must match the column count;
    /// keyed rows are projected by lookup name, absent keys reading as
    /// NULL.
    pub(crate) fn normalize_row(&self, row: BulkRow) -> Result<Vec<tabstream_types::SqlValue>> {
        match row {
            BulkRow::Tuple(values) => {
                if values.len() != self.columns.len() {
                    return Err(Error::BulkInput(format!(
                        "Wrong number of row values: expected {}, got {}.",
                        self.columns.len(),
                        values.len()
                    )));
                }
                Ok(values)
            }
            BulkRow::Named(mut pairs) => Ok(self
                .columns
                .iter()
                .map(|col| {
                    pairs
                        .iter_mut()
                        .find(|(name, _)| name == &col.name)
                        .map(|(_, value)| std::mem::take(value))
                        .unwrap_or_default()
                })
                .collect()),
        }
    }
}

/// Clonable cancellation handle for a bulk load.
#[derive(Debug, Clone)]
pub struct BulkLoadHandle {
    cancel: Arc<CancelFlag>,
}

impl BulkLoadHandle {
    /// Request cancellation of the bulk load. Idempotent.
    pub fn cancel(&self) {
        self.cancel.request();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_requested()
    }
}

/// Escape `]` for use inside a bracketed identifier.
fn escape_bracket(name: &str) -> String {
    name.replace(']', "]]")
}
