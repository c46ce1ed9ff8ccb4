//! Synchronous CSV reader with iterator interface
//!
//! Streams ledger operation records from an export file one row at a time,
//! delegating row conversion to the `csv_format` module.
//!
//! ```no_run
//! use merchant_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("operations.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(record) => println!("Replaying: {:?}", record),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row errors are yielded as `Err` items carrying the line number

use crate::io::csv_format::{convert_csv_record, CsvRecord, OperationRecord};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl SyncReader {
    /// Open an operations export
    ///
    /// The reader trims every field and accepts short rows, since `to` is
    /// only present on transfers.
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if the file opened
    /// * `Err(String)` if it could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<OperationRecord, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();

        let row = deserializer.next()?;
        self.line_num += 1;
        // +1 for the header row
        let line = self.line_num + 1;
        Some(match row {
            Ok(csv_record) => convert_csv_record(csv_record).map_err(|e| format!("Line {line}: {e}")),
            Err(e) => Err(format!("Line {line}: CSV parse error: {e}")),
        })
    }
}
