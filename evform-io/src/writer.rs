//! CSV output of reduced events.

use crate::Result;
use evform_core::{ReducedEvent, ReducedHit};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column header written first.
pub const CSV_HEADER: &str =
    "x,y,z,time,good,hits_used,x_lower,x_upper,y_lower,y_upper,z_lower,z_upper";

/// Writer of one CSV row per reduced event.
///
/// Dimensions that are not tracked are written as empty fields; undefined
/// centers as `NaN`.
pub struct CsvEventWriter {
    writer: BufWriter<File>,
    rows: u64,
}

fn center(hit: Option<&ReducedHit>) -> String {
    hit.map(|hit| hit.center.to_string()).unwrap_or_default()
}

fn spans(hit: Option<&ReducedHit>) -> (String, String) {
    hit.map(|hit| (hit.uncert_lower.to_string(), hit.uncert_upper.to_string()))
        .unwrap_or_default()
}

impl CsvEventWriter {
    /// Creates the file and writes the header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{CSV_HEADER}")?;
        Ok(Self { writer, rows: 0 })
    }

    /// Rows written so far, excluding the header.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Writes one event.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_event(&mut self, event: &ReducedEvent) -> Result<()> {
        let [x, y, z] = event.dimensions();
        let (x_lower, x_upper) = spans(x);
        let (y_lower, y_upper) = spans(y);
        let (z_lower, z_upper) = spans(z);
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            center(x),
            center(y),
            center(z),
            event.time,
            u8::from(event.good),
            event.hits_used(),
            x_lower,
            x_upper,
            y_lower,
            y_upper,
            z_lower,
            z_upper
        )?;
        self.rows += 1;
        Ok(())
    }

    /// Writes every event.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn write_events(&mut self, events: &[ReducedEvent]) -> Result<()> {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error on write failure.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
