//! # tabstream-types
//!
//! SQL value representation and the data type registry for the
//! tabstream driver.
//!
//! [`SqlValue`] is the dynamic value type callers hand to the bulk
//! engine; [`SqlType`] describes a declared column type and knows how to
//! validate cells, emit its COLMETADATA tail, and encode values in the
//! ROW token wire format.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod encode;
pub mod error;
pub mod sql_type;
pub mod value;

pub use encode::EncodeOptions;
pub use error::TypeError;
pub use sql_type::{SqlType, VarLen};
pub use value::SqlValue;
