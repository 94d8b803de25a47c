//! Metadata read/write gateway.
//!
//! [`MetadataGateway`] is the seam between the pipeline and the external
//! metadata tool. [`ExifTool`] implements it over a single persistent
//! process; [`fields`] holds the alias tables and the reduction from raw
//! tool output to a [`CanonicalRecord`](crate::models::CanonicalRecord).

mod exiftool;
pub mod fields;
mod gateway;

pub use exiftool::{EXIFTOOL_ENV, ExifTool, ExifToolBuilder, read_args, write_args};
pub use fields::{RawFieldMap, ValidationSummary, reduce};
pub use gateway::{MetadataError, MetadataGateway, WriteOptions};
