//! Reference hit-record codec.
//!
//! Instrument front-ends each have their own wire format; [`HitParser`] is
//! the seam where one plugs in. [`FixedHitParser`] decodes the fixed record
//! produced by the `generate`/`send` tooling and stored in dump files.
//!
//! Record layout, little-endian, [`RECORD_SIZE`] bytes:
//!
//! | offset | size | field      |
//! |--------|------|------------|
//! | 0      | 8    | time       |
//! | 8      | 2    | coordinate |
//! | 10     | 2    | weight     |
//! | 12     | 1    | plane      |
//! | 13     | 3    | reserved   |

use evform_core::Hit;

/// Size of one encoded hit.
pub const RECORD_SIZE: usize = 16;

/// Counts from decoding one datagram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Hits appended to the output.
    pub hits: usize,
    /// Records that could not be decoded.
    pub errors: usize,
}

/// Decodes raw datagrams into hits.
pub trait HitParser: Send {
    /// Returns the parser name.
    fn name(&self) -> &'static str;

    /// Appends the hits in `data` to `hits`.
    fn parse(&mut self, data: &[u8], hits: &mut Vec<Hit>) -> ParseReport;
}

/// Parser for the fixed 16-byte record.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedHitParser;

impl FixedHitParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HitParser for FixedHitParser {
    fn name(&self) -> &'static str {
        "Fixed16"
    }

    /// A trailing partial record and records on the reserved plane are
    /// counted as errors and skipped.
    fn parse(&mut self, data: &[u8], hits: &mut Vec<Hit>) -> ParseReport {
        let mut report = ParseReport::default();
        let records = data.chunks_exact(RECORD_SIZE);
        if !records.remainder().is_empty() {
            report.errors += 1;
        }
        for record in records {
            match decode_hit(record) {
                Some(hit) => {
                    hits.push(hit);
                    report.hits += 1;
                }
                None => report.errors += 1,
            }
        }
        report
    }
}

/// Appends the record for `hit` to `out`.
pub fn encode_hit(hit: &Hit, out: &mut Vec<u8>) {
    out.extend_from_slice(&hit.time.to_le_bytes());
    out.extend_from_slice(&hit.coordinate.to_le_bytes());
    out.extend_from_slice(&hit.weight.to_le_bytes());
    out.push(hit.plane);
    out.extend_from_slice(&[0; 3]);
}

/// Encodes every hit.
#[must_use]
pub fn encode_hits(hits: &[Hit]) -> Vec<u8> {
    let mut out = Vec::with_capacity(hits.len() * RECORD_SIZE);
    for hit in hits {
        encode_hit(hit, &mut out);
    }
    out
}

/// Decodes one record. Returns `None` for a short record or the reserved
/// plane.
#[must_use]
pub fn decode_hit(record: &[u8]) -> Option<Hit> {
    let record: &[u8; RECORD_SIZE] = record.get(..RECORD_SIZE)?.try_into().ok()?;
    let plane = record[12];
    if plane == Hit::INVALID_PLANE {
        return None;
    }
    let mut time = [0u8; 8];
    time.copy_from_slice(&record[0..8]);
    Some(Hit::new(
        u64::from_le_bytes(time),
        plane,
        u16::from_le_bytes([record[8], record[9]]),
        u16::from_le_bytes([record[10], record[11]]),
    ))
}

/// Number of whole records that fit in `bytes`.
#[must_use]
pub fn records_per(bytes: usize) -> usize {
    bytes / RECORD_SIZE
}
