//! Capture-file readers for offline replay.
//!
//! Two forms are supported. The raw form is what the capture recorder dumps:
//! a flat sequence of 8-byte little-endian records
//!
//! ```text
//! object: u8, sensor: u8, length: u16, timestamp: u32
//! ```
//!
//! The text form is one event per line, `object sensor timestamp length`,
//! with `#` comments and blank lines ignored; handy for hand-written test
//! streams.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};

use crate::event::LightcapEvent;

/// One replayed event together with the object it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRecord {
    pub object: u8,
    pub event: LightcapEvent,
}

/// Read a capture, picking the format from the file extension (`.rec` and
/// `.bin` are raw, everything else is text).
pub fn read_capture(path: &Path) -> Result<Vec<CaptureRecord>> {
    let file = File::open(path).with_context(|| format!("open capture {}", path.display()))?;
    let raw = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("rec") | Some("bin")
    );
    if raw {
        read_raw(file).with_context(|| format!("parse raw capture {}", path.display()))
    } else {
        read_text(BufReader::new(file))
            .with_context(|| format!("parse text capture {}", path.display()))
    }
}

/// Read raw 8-byte records until end of stream.
pub fn read_raw<R: Read>(mut reader: R) -> Result<Vec<CaptureRecord>> {
    let mut records = Vec::new();
    loop {
        let object = match reader.read_u8() {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("read capture record"),
        };
        let sensor_id = reader.read_u8().context("truncated capture record")?;
        let length = reader
            .read_u16::<LittleEndian>()
            .context("truncated capture record")?;
        let timestamp = reader
            .read_u32::<LittleEndian>()
            .context("truncated capture record")?;
        records.push(CaptureRecord {
            object,
            event: LightcapEvent { sensor_id, length, timestamp },
        });
    }
    Ok(records)
}

/// Read whitespace-separated text records.
pub fn read_text<R: BufRead>(reader: R) -> Result<Vec<CaptureRecord>> {
    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.context("read capture line")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            bail!("line {}: expected 4 fields, got {}", lineno + 1, fields.len());
        }
        let parse = |what: &str, s: &str| -> Result<u64> {
            s.parse::<u64>()
                .with_context(|| format!("line {}: bad {} {:?}", lineno + 1, what, s))
        };
        let object = parse("object", fields[0])?;
        let sensor = parse("sensor", fields[1])?;
        let timestamp = parse("timestamp", fields[2])?;
        let length = parse("length", fields[3])?;
        if object > u8::MAX as u64 || sensor > u8::MAX as u64 {
            bail!("line {}: object/sensor out of range", lineno + 1);
        }
        if length > u16::MAX as u64 || timestamp > u32::MAX as u64 {
            bail!("line {}: length/timestamp out of range", lineno + 1);
        }
        records.push(CaptureRecord {
            object: object as u8,
            event: LightcapEvent {
                sensor_id: sensor as u8,
                length: length as u16,
                timestamp: timestamp as u32,
            },
        });
    }
    Ok(records)
}
