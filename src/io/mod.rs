//! I/O module
//!
//! CSV handling for the ledger replay tool.
//!
//! - `csv_format` - row conversion and balance output serialization
//! - `sync_reader` - streaming reader with iterator interface

pub mod csv_format;
pub mod sync_reader;

pub use csv_format::{convert_csv_record, write_accounts_csv, CsvRecord, OperationRecord};
pub use sync_reader::SyncReader;
