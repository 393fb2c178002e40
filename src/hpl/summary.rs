//! HPL result lines and the encoded variant token
//!
//! Every HPL result starts with a token such as `WR11C2R4` that encodes the
//! algorithmic variant of the run:
//!
//! | pos | meaning                  | values            |
//! |-----|--------------------------|-------------------|
//! | 0   | unused (`W`)             |                   |
//! | 1   | process ordering         | `R` row, `C` col  |
//! | 2   | look-ahead depth         | digit             |
//! | 3   | broadcast algorithm      | `0`..`5`          |
//! | 4   | recursive factorization  | `L`, `C`, `R`     |
//! | 5   | recursion divisor (NDIV) | digit             |
//! | 6   | panel factorization      | `L`, `C`, `R`     |
//! | 7.. | recursive stop (NBMIN)   | digits            |

use crate::config::AlgorithmKnobs;
use crate::error::{HarnessError, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Decoded algorithmic variant of one HPL run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Variant {
    /// Process mapping (0 row-major, 1 column-major)
    pub pmap: i64,
    /// Look-ahead depth
    pub depth: i64,
    /// Broadcast algorithm
    pub bcast: i64,
    /// Recursive panel factorization (0 left, 1 Crout, 2 right)
    pub rfact: i64,
    /// Panels in recursion
    pub ndiv: i64,
    /// Panel factorization (0 left, 1 Crout, 2 right)
    pub pfact: i64,
    /// Recursive stopping criterium
    pub nbmin: i64,
}

/// Knob names carried by a [`Variant`]
pub const VARIANT_KNOBS: [&str; 7] = ["pmap", "depth", "bcast", "rfact", "ndiv", "pfact", "nbmin"];

fn factorization(c: char) -> Option<i64> {
    match c {
        'L' => Some(0),
        'C' => Some(1),
        'R' => Some(2),
        _ => None,
    }
}

fn factorization_code(value: i64) -> Result<char> {
    match value {
        0 => Ok('L'),
        1 => Ok('C'),
        2 => Ok('R'),
        _ => Err(HarnessError::config(format!("factorization variant {} out of range", value))),
    }
}

fn digit(value: i64, what: &str) -> Result<char> {
    u32::try_from(value)
        .ok()
        .and_then(|v| char::from_digit(v, 10))
        .ok_or_else(|| HarnessError::config(format!("{} {} does not fit one digit", what, value)))
}

impl Variant {
    /// Decode a result token such as `WR11C2R4`
    pub fn decode(token: &str) -> Result<Self> {
        let bad = || HarnessError::parse("variant", format!("malformed token '{}'", token));
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 8 {
            return Err(bad());
        }

        let pmap = match chars[1] {
            'R' => 0,
            'C' => 1,
            _ => return Err(bad()),
        };
        let num = |c: char| c.to_digit(10).map(i64::from).ok_or_else(bad);
        let nbmin = token
            .get(7..)
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(bad)?;

        Ok(Self {
            pmap,
            depth: num(chars[2])?,
            bcast: num(chars[3])?,
            rfact: factorization(chars[4]).ok_or_else(bad)?,
            ndiv: num(chars[5])?,
            pfact: factorization(chars[6]).ok_or_else(bad)?,
            nbmin,
        })
    }

    /// Encode back into the result-token form
    pub fn encode(&self) -> Result<String> {
        let ordering = match self.pmap {
            0 => 'R',
            1 => 'C',
            other => return Err(HarnessError::config(format!("pmap {} out of range", other))),
        };
        if self.nbmin < 0 {
            return Err(HarnessError::config(format!("nbmin {} out of range", self.nbmin)));
        }

        Ok(format!(
            "W{}{}{}{}{}{}{}",
            ordering,
            digit(self.depth, "depth")?,
            digit(self.bcast, "bcast")?,
            factorization_code(self.rfact)?,
            digit(self.ndiv, "ndiv")?,
            factorization_code(self.pfact)?,
            self.nbmin
        ))
    }

    /// The variant as algorithm knobs
    pub fn knobs(&self) -> AlgorithmKnobs {
        VARIANT_KNOBS
            .iter()
            .zip([
                self.pmap, self.depth, self.bcast, self.rfact, self.ndiv, self.pfact, self.nbmin,
            ])
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Rebuild a variant from knobs; every variant knob must be present
    pub fn from_knobs(knobs: &AlgorithmKnobs) -> Result<Self> {
        let get = |name: &str| {
            knobs
                .get(name)
                .copied()
                .ok_or_else(|| HarnessError::config(format!("knob '{}' is not set", name)))
        };
        Ok(Self {
            pmap: get("pmap")?,
            depth: get("depth")?,
            bcast: get("bcast")?,
            rfact: get("rfact")?,
            ndiv: get("ndiv")?,
            pfact: get("pfact")?,
            nbmin: get("nbmin")?,
        })
    }
}

/// One result line plus its residual-check status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    /// Encoded variant token as printed
    pub token: String,
    /// Problem size
    pub n: u64,
    /// Block size
    pub nb: u64,
    /// Process rows
    pub p: usize,
    /// Process columns
    pub q: usize,
    /// Wall time in seconds
    pub time_s: f64,
    /// Throughput in Gflop/s
    pub gflops: f64,
    /// Whether the residual check passed
    pub passed: bool,
}

impl SummaryRecord {
    /// Decode the variant token
    pub fn variant(&self) -> Result<Variant> {
        Variant::decode(&self.token)
    }
}

fn result_line() -> &'static Regex {
    static RESULT_LINE: OnceLock<Regex> = OnceLock::new();
    RESULT_LINE.get_or_init(|| {
        Regex::new(
            r"^\s*(W[RC]\d\d[LCR]\d[LCR]\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+([0-9.eE+-]+)\s+([0-9.eE+-]+)",
        )
        .expect("valid HPL result pattern")
    })
}

/// Collect every result line in `output`.
///
/// The status of a result is the first `PASSED` or `FAILED` found after it
/// and before the next result line; a result without status counts as
/// failed.
pub fn parse_summaries(output: &str) -> Vec<SummaryRecord> {
    let lines: Vec<&str> = output.lines().collect();
    let mut records = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = result_line().captures(line) else {
            continue;
        };
        let parsed = (|| {
            Some(SummaryRecord {
                token: caps[1].to_string(),
                n: caps[2].parse().ok()?,
                nb: caps[3].parse().ok()?,
                p: caps[4].parse().ok()?,
                q: caps[5].parse().ok()?,
                time_s: caps[6].parse().ok()?,
                gflops: caps[7].parse().ok()?,
                passed: false,
            })
        })();
        let Some(mut record) = parsed else {
            continue;
        };

        record.passed = lines[i + 1..]
            .iter()
            .take_while(|l| !result_line().is_match(l))
            .find_map(|l| {
                if l.contains("PASSED") {
                    Some(true)
                } else if l.contains("FAILED") {
                    Some(false)
                } else {
                    None
                }
            })
            .unwrap_or(false);
        records.push(record);
    }

    records
}

/// Passing records sorted by descending throughput
pub fn rank(records: Vec<SummaryRecord>) -> Vec<SummaryRecord> {
    let mut passing: Vec<SummaryRecord> = records.into_iter().filter(|r| r.passed).collect();
    passing.sort_by(|a, b| b.gflops.total_cmp(&a.gflops));
    passing
}
