//! Track domain model.
//!
//! A track is one observed entity persisted across ticks. Tracks are owned
//! exclusively by the belief bus; consumers see immutable snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque stable identifier for a track, assigned on first observation.
///
/// Allocation is a monotone counter in ingest order, so two buses fed the
/// same evidence stream assign identical ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trk-{}", self.0)
    }
}

/// Visibility state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Seen this tick.
    Visible,
    /// Not seen recently; position extrapolated from the last observation.
    Inferred,
    /// Aged out; eligible for eviction.
    Lost,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Inferred => "inferred",
            Self::Lost => "lost",
        }
    }
}

/// Threat level assigned by the threat policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Default for ThreatLevel {
    fn default() -> Self {
        Self::None
    }
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether this level is at or above `other`.
    pub fn at_least(&self, other: Self) -> bool {
        *self >= other
    }
}

/// Coarse distance bucket: 0 = none, 1 = <16, 2 = [16,64), 3 = >= 64.
pub type DistBucket = u8;

/// Map a raw distance to its coarse bucket.
///
/// Undefined, negative, or non-finite distances map to bucket 0 so that
/// missing range data never aliases with a real reading.
pub fn distance_to_bucket(distance: Option<f64>) -> DistBucket {
    match distance {
        Some(d) if d.is_finite() && d >= 0.0 => {
            if d < 16.0 {
                1
            } else if d < 64.0 {
                2
            } else {
                3
            }
        }
        _ => 0,
    }
}

/// Side length of a position bucket cell, in world units.
pub const POS_BUCKET_CELL: f64 = 8.0;

/// Integer position bucket (coarse quantization of a raw position).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PosBucket {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl PosBucket {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Quantize a raw position into its bucket.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_raw(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: (x / POS_BUCKET_CELL).floor() as i32,
            y: (y / POS_BUCKET_CELL).floor() as i32,
            z: (z / POS_BUCKET_CELL).floor() as i32,
        }
    }

    /// Chebyshev distance between two buckets.
    pub fn chebyshev(&self, other: &Self) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        let dz = (self.z - other.z).unsigned_abs();
        dx.max(dy).max(dz)
    }
}

/// Line-of-sight state reported by the perception layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOfSight {
    Visible,
    Unknown,
}

impl Default for LineOfSight {
    fn default() -> Self {
        Self::Unknown
    }
}

/// One raw observation item inside an evidence batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Engine-side entity id. Evidence provenance only; never keys
    /// association.
    pub engine_id: u64,
    /// Class label, e.g. `"zombie"`.
    pub kind: String,
    /// Small-int class discriminator.
    pub kind_enum: u16,
    /// Quantized position.
    #[serde(default)]
    pub pos_bucket: PosBucket,
    /// Coarse distance bucket.
    #[serde(default)]
    pub dist_bucket: DistBucket,
    /// Line-of-sight state.
    #[serde(default)]
    pub los: LineOfSight,
    /// Opaque feature bag. Ordered map so serialization is deterministic.
    #[serde(default)]
    pub features: BTreeMap<String, serde_json::Value>,
}

impl EvidenceItem {
    /// Minimal item for a labelled entity at a distance bucket.
    pub fn new(engine_id: u64, kind: impl Into<String>, kind_enum: u16, dist_bucket: DistBucket) -> Self {
        Self {
            engine_id,
            kind: kind.into(),
            kind_enum,
            pos_bucket: PosBucket::default(),
            dist_bucket,
            los: LineOfSight::Visible,
            features: BTreeMap::new(),
        }
    }

    pub fn with_pos(mut self, pos: PosBucket) -> Self {
        self.pos_bucket = pos;
        self
    }

    pub fn with_los(mut self, los: LineOfSight) -> Self {
        self.los = los;
        self
    }
}

/// A batch of raw observations for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBatch {
    pub tick_id: u64,
    pub items: Vec<EvidenceItem>,
}

impl EvidenceBatch {
    pub fn new(tick_id: u64) -> Self {
        Self {
            tick_id,
            items: Vec::new(),
        }
    }

    pub fn with_items(tick_id: u64, items: Vec<EvidenceItem>) -> Self {
        Self { tick_id, items }
    }
}

/// One persisted per-entity belief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: TrackId,
    pub class_label: String,
    pub kind_enum: u16,
    pub pos_bucket: PosBucket,
    pub dist_bucket: DistBucket,
    pub visibility: Visibility,
    pub threat_level: ThreatLevel,
    /// Belief confidence in [0, 1].
    pub confidence: f64,
    /// Probability mass assigned to "this association is wrong", in [0, 1].
    pub p_unknown: f64,
    pub first_seen_tick: u64,
    pub last_seen_tick: u64,
}

impl Track {
    /// Open a candidate track from a first observation.
    pub fn from_evidence(track_id: TrackId, item: &EvidenceItem, tick: u64) -> Self {
        Self {
            track_id,
            class_label: item.kind.clone(),
            kind_enum: item.kind_enum,
            pos_bucket: item.pos_bucket,
            dist_bucket: item.dist_bucket,
            visibility: Visibility::Visible,
            threat_level: ThreatLevel::None,
            confidence: 0.5,
            p_unknown: 0.5,
            first_seen_tick: tick,
            last_seen_tick: tick,
        }
    }

    /// Ticks since this track was last observed, given the current tick.
    pub fn age(&self, current_tick: u64) -> u64 {
        current_tick.saturating_sub(self.last_seen_tick)
    }

    /// Invariant: first observation never postdates the last one.
    pub fn is_well_formed(&self) -> bool {
        self.first_seen_tick <= self.last_seen_tick
            && (0.0..=1.0).contains(&self.confidence)
            && (0.0..=1.0).contains(&self.p_unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_bucket_boundaries() {
        assert_eq!(distance_to_bucket(None), 0);
        assert_eq!(distance_to_bucket(Some(-1.0)), 0);
        assert_eq!(distance_to_bucket(Some(f64::NAN)), 0);
        assert_eq!(distance_to_bucket(Some(0.0)), 1);
        assert_eq!(distance_to_bucket(Some(15.9)), 1);
        assert_eq!(distance_to_bucket(Some(16.0)), 2);
        assert_eq!(distance_to_bucket(Some(63.9)), 2);
        assert_eq!(distance_to_bucket(Some(64.0)), 3);
        assert_eq!(distance_to_bucket(Some(1000.0)), 3);
    }

    #[test]
    fn test_pos_bucket_quantization() {
        let a = PosBucket::from_raw(0.0, 0.0, 0.0);
        let b = PosBucket::from_raw(7.9, 7.9, 7.9);
        assert_eq!(a, b);

        let c = PosBucket::from_raw(8.0, 0.0, 0.0);
        assert_ne!(a, c);
        assert_eq!(a.chebyshev(&c), 1);

        let d = PosBucket::from_raw(-0.1, 0.0, 0.0);
        assert_eq!(d.x, -1);
    }

    #[test]
    fn test_track_from_evidence() {
        let item = EvidenceItem::new(10, "zombie", 3, 3);
        let track = Track::from_evidence(TrackId(1), &item, 5);
        assert_eq!(track.class_label, "zombie");
        assert_eq!(track.first_seen_tick, 5);
        assert_eq!(track.last_seen_tick, 5);
        assert_eq!(track.visibility, Visibility::Visible);
        assert!(track.is_well_formed());
    }

    #[test]
    fn test_track_age() {
        let item = EvidenceItem::new(10, "zombie", 3, 3);
        let track = Track::from_evidence(TrackId(1), &item, 5);
        assert_eq!(track.age(5), 0);
        assert_eq!(track.age(9), 4);
        assert_eq!(track.age(3), 0); // saturates, never underflows
    }

    #[test]
    fn test_threat_level_ordering() {
        assert!(ThreatLevel::Critical.at_least(ThreatLevel::High));
        assert!(ThreatLevel::Low.at_least(ThreatLevel::Low));
        assert!(!ThreatLevel::None.at_least(ThreatLevel::Low));
    }
}
