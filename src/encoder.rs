//! CSV encoding
//!
//! Reads the raw access log and writes (and reads back) the result tables.
//! Every table is written with a header row, even when it has no data rows.

use crate::error::AnalyticsError;
use crate::schema::{RawGateRow, INPUT_COLUMNS};
use crate::types::{ClusterAssignment, ClusterCentroid, UserAttendance, UserLongestSession};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// A row type with a fixed CSV layout
pub trait TableRow: Serialize + DeserializeOwned {
    /// Column names, in output order
    const COLUMNS: &'static [&'static str];
}

impl TableRow for RawGateRow {
    const COLUMNS: &'static [&'static str] = &INPUT_COLUMNS;
}

impl TableRow for UserAttendance {
    const COLUMNS: &'static [&'static str] =
        &["user_id", "time", "days", "average_per_day", "rank"];
}

impl TableRow for UserLongestSession {
    const COLUMNS: &'static [&'static str] = &["user_id", "session_length"];
}

impl TableRow for ClusterAssignment {
    const COLUMNS: &'static [&'static str] = &["user_id", "cluster"];
}

impl TableRow for ClusterCentroid {
    const COLUMNS: &'static [&'static str] = &["cluster", "average_per_day", "days_present"];
}

/// CSV encoder for input and output tables
pub struct TableEncoder;

impl TableEncoder {
    /// Load the raw access log from a CSV file
    pub fn read_raw_rows(path: &Path) -> Result<Vec<RawGateRow>, AnalyticsError> {
        let file = File::open(path)?;
        Self::read_raw_rows_from(file)
    }

    /// Load the raw access log from any reader
    ///
    /// Rows with missing trailing columns are kept with empty values so that
    /// cleaning can report them instead of failing the whole load.
    pub fn read_raw_rows_from<R: Read>(reader: R) -> Result<Vec<RawGateRow>, AnalyticsError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            let row: RawGateRow = result?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Write a table to a CSV file, replacing any existing file
    pub fn write<T: TableRow>(path: &Path, rows: &[T]) -> Result<(), AnalyticsError> {
        let file = File::create(path)?;
        Self::write_to(file, rows)
    }

    /// Write a table to any writer
    pub fn write_to<W: Write, T: TableRow>(writer: W, rows: &[T]) -> Result<(), AnalyticsError> {
        let mut wtr = csv::Writer::from_writer(writer);

        if rows.is_empty() {
            wtr.write_record(T::COLUMNS)?;
        }
        for row in rows {
            wtr.serialize(row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Encode a table to a CSV string
    pub fn encode_to_string<T: TableRow>(rows: &[T]) -> Result<String, AnalyticsError> {
        let mut buffer = Vec::new();
        Self::write_to(&mut buffer, rows)?;
        String::from_utf8(buffer)
            .map_err(|e| AnalyticsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Read a previously written table back from a CSV file
    pub fn read<T: TableRow>(path: &Path) -> Result<Vec<T>, AnalyticsError> {
        let file = File::open(path)?;
        Self::read_from(file)
    }

    /// Read a table from any reader
    pub fn read_from<R: Read, T: TableRow>(reader: R) -> Result<Vec<T>, AnalyticsError> {
        let mut rdr = csv::Reader::from_reader(reader);

        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            rows.push(result?);
        }
        Ok(rows)
    }
}
