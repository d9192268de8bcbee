//! Watched-second heatmap and its range encoding
//!
//! A heatmap maps each watched second to the number of times playback passed
//! it. For transport it is compressed into runs of contiguous seconds sharing
//! the same count:
//!
//! ```text
//! {1:1, 2:1, 4:3, 5:3, 9:1}  ->  "1-2,4-5:3,9"
//! ```
//!
//! Each run renders as `S`, `S-E`, `S:N` or `S-E:N`; the end is written only
//! for runs longer than one second and the count only when above one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-second view counts for one viewing session
///
/// Every stored count is at least 1. Deserialized maps go through
/// [`Heatmap::set`], so zero entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<u64, u32>", into = "BTreeMap<u64, u32>")]
pub struct Heatmap {
    seconds: BTreeMap<u64, u32>,
}

impl Heatmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more pass over `second`, returning the new count
    pub fn increment(&mut self, second: u64) -> u32 {
        let count = self.seconds.entry(second).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Overwrite the count stored for `second`
    ///
    /// Last write wins; a zero count is ignored.
    pub fn set(&mut self, second: u64, count: u32) {
        if count > 0 {
            self.seconds.insert(second, count);
        }
    }

    pub fn get(&self, second: u64) -> Option<u32> {
        self.seconds.get(&second).copied()
    }

    /// Number of distinct watched seconds
    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }

    /// Watched seconds and counts in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.seconds.iter().map(|(&s, &c)| (s, c))
    }

    /// Contiguous equal-count runs in ascending order
    pub fn ranges(&self) -> Vec<HeatmapRange> {
        let mut runs: Vec<HeatmapRange> = Vec::new();
        for (second, count) in self.iter() {
            match runs.last_mut() {
                Some(run) if run.count == count && run.end + 1 == second => run.end = second,
                _ => runs.push(HeatmapRange {
                    start: second,
                    end: second,
                    count,
                }),
            }
        }
        runs
    }

    /// Encode this heatmap; see [`encode_ranges`]
    pub fn encode(&self, duration_secs: u64) -> EncodedHeatmap {
        encode_ranges(self, duration_secs)
    }
}

impl FromIterator<(u64, u32)> for Heatmap {
    fn from_iter<I: IntoIterator<Item = (u64, u32)>>(iter: I) -> Self {
        let mut heatmap = Heatmap::new();
        for (second, count) in iter {
            heatmap.set(second, count);
        }
        heatmap
    }
}

impl From<BTreeMap<u64, u32>> for Heatmap {
    fn from(seconds: BTreeMap<u64, u32>) -> Self {
        seconds.into_iter().collect()
    }
}

impl From<Heatmap> for BTreeMap<u64, u32> {
    fn from(heatmap: Heatmap) -> Self {
        heatmap.seconds
    }
}

/// One run of contiguous seconds sharing a view count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapRange {
    /// First second of the run
    pub start: u64,
    /// Last second of the run, inclusive
    pub end: u64,
    /// View count shared by every second in the run
    pub count: u32,
}

impl HeatmapRange {
    /// Number of seconds covered
    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl std::fmt::Display for HeatmapRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.start)?;
        if self.end != self.start {
            write!(f, "-{}", self.end)?;
        }
        if self.count > 1 {
            write!(f, ":{}", self.count)?;
        }
        Ok(())
    }
}

/// Range-encoded heatmap ready for the `hm` and `prg` payload fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedHeatmap {
    /// Comma-joined runs, e.g. `"1-2,4:3"`
    pub ranges: String,
    /// Distinct watched seconds, capped at the known duration
    pub unique_seconds: u64,
}

/// Compress a heatmap into its range string and unique-second count
///
/// `duration_secs` of 0 means the duration is unknown and the unique count is
/// left uncapped.
pub fn encode_ranges(heatmap: &Heatmap, duration_secs: u64) -> EncodedHeatmap {
    if heatmap.is_empty() {
        return EncodedHeatmap::default();
    }

    let ranges = heatmap
        .ranges()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let distinct = heatmap.len() as u64;
    let unique_seconds = if duration_secs > 0 {
        distinct.min(duration_secs)
    } else {
        distinct
    };

    EncodedHeatmap {
        ranges,
        unique_seconds,
    }
}
