//! Recorded pulse-stream replay.
//!
//! Live captures log one event per line — `<seconds> <sensor_id> <length>
//! <timestamp>`, whitespace separated, with the wall-clock column relative
//! to the start of the recording. This module parses those logs back into
//! [`LightEvent`]s so captured streams can be re-driven through a
//! [`Disambiguator`] offline.
//!
//! Blank lines and `#` comments are skipped, so hand-annotated captures
//! replay unchanged.
//!
//! [`Disambiguator`]: crate::tracker::Disambiguator

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::types::LightEvent;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read lightcap log: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// One replayed event with its capture-relative wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayEvent {
    /// Seconds since the start of the recording.
    pub seconds: f64,
    pub event: LightEvent,
}

/// A parsed lightcap recording.
#[derive(Debug, Default)]
pub struct LightcapLog {
    events: Vec<ReplayEvent>,
}

impl LightcapLog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self, ReplayError> {
        let mut events = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            events.push(parse_line(trimmed, index + 1)?);
        }
        debug!(events = events.len(), "lightcap log loaded");
        Ok(Self { events })
    }

    pub fn events(&self) -> &[ReplayEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The raw events, stripped of their wall-clock column.
    pub fn light_events(&self) -> impl Iterator<Item = LightEvent> + '_ {
        self.events.iter().map(|replay| replay.event)
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<ReplayEvent, ReplayError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(ReplayError::Malformed {
            line: line_no,
            reason: format!("expected 4 fields, got {}", fields.len()),
        });
    }

    let seconds: f64 = fields[0]
        .parse()
        .map_err(|e| malformed(line_no, "seconds", e))?;
    let sensor_id: u8 = fields[1]
        .parse()
        .map_err(|e| malformed(line_no, "sensor id", e))?;
    let length: u32 = fields[2]
        .parse()
        .map_err(|e| malformed(line_no, "length", e))?;
    let timestamp: u32 = fields[3]
        .parse()
        .map_err(|e| malformed(line_no, "timestamp", e))?;

    Ok(ReplayEvent {
        seconds,
        event: LightEvent {
            sensor_id,
            timestamp,
            length,
        },
    })
}

fn malformed(line: usize, field: &str, err: impl std::fmt::Display) -> ReplayError {
    ReplayError::Malformed {
        line,
        reason: format!("invalid {field}: {err}"),
    }
}
