//! Rotating daily CSV files.
//!
//! One sink owns one dated append-only file. Rotation itself is decided by
//! the sampling loop comparing date strings; the sink only knows which date
//! it was opened for.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// First line of every log file.
pub const CSV_HEADER: &str = "Time,Weight_g,Weight_x100_g,RawADC";

/// One measurement. Produced once per tick and written exactly once.
#[derive(Debug, Clone, Copy)]
pub struct WeightSample {
    pub timestamp: DateTime<Local>,
    pub weight_g: f32,
    pub weight_x100_g: f32,
    pub raw_adc: i32,
}

impl WeightSample {
    /// Formats the row: local ISO-8601 timestamp with microseconds, both
    /// weights to 3 decimal places, raw count as a plain integer.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.3},{:.3},{}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
            self.weight_g,
            self.weight_x100_g,
            self.raw_adc
        )
    }
}

/// Replaces anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `weight_data_{tag_}{YYYY-MM-DD}.csv`, tag optional.
pub fn daily_file_name(tag: &str, date: &str) -> String {
    let tag = sanitize_tag(tag);
    if tag.is_empty() {
        format!("weight_data_{date}.csv")
    } else {
        format!("weight_data_{tag}_{date}.csv")
    }
}

pub struct CsvSink {
    file: File,
    path: PathBuf,
    date: String,
}

impl CsvSink {
    /// Opens (or creates) the dated file for appending.
    ///
    /// The header is written exactly once: only when the file is empty or
    /// its first line does not already carry the expected header.
    pub fn open(dir: &Path, tag: &str, date: &str) -> io::Result<Self> {
        let path = dir.join(daily_file_name(tag, date));
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let needs_header = if file.metadata()?.len() == 0 {
            true
        } else {
            file.seek(SeekFrom::Start(0))?;
            let mut first = String::new();
            BufReader::new(&file).read_line(&mut first)?;
            !first.contains(CSV_HEADER)
        };
        if needs_header {
            writeln!(file, "{CSV_HEADER}")?;
            file.flush()?;
        }

        Ok(Self {
            file,
            path,
            date: date.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Date string this file was opened for, compared each tick to decide
    /// rotation.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Appends one row and flushes it before returning. Sample rates are
    /// seconds-scale, so the row hits the OS before the next tick starts.
    pub fn append(&mut self, sample: &WeightSample) -> io::Result<()> {
        writeln!(self.file, "{}", sample.csv_row())?;
        self.file.flush()
    }
}
