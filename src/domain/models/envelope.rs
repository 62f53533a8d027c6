//! Belief envelope wire model.
//!
//! Envelopes are the out-going messages from the belief bus, carrying an
//! optional snapshot plus a capped saliency-delta batch. Field order on the
//! wire is fixed: `request_version, type, bot_id, stream_id, seq, tick_id,
//! saliency_events, snapshot?`. Serialization is byte-stable: two buses fed
//! identical evidence produce byte-identical envelopes.

use serde::{Deserialize, Serialize};

use super::track::{DistBucket, PosBucket, ThreatLevel, Track, TrackId, Visibility};

/// Literal `request_version` for saliency-delta envelopes.
pub const REQUEST_VERSION: &str = "saliency_delta";

/// Literal envelope `type`.
pub const ENVELOPE_TYPE: &str = "environmental_awareness";

/// Wire form of a track inside snapshots and `new_threat` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track_id: TrackId,
    pub class_label: String,
    pub kind_enum: u16,
    pub pos_bucket: PosBucket,
    pub dist_bucket: DistBucket,
    pub visibility: Visibility,
    pub threat_level: ThreatLevel,
    pub confidence: f64,
    pub p_unknown: f64,
    pub first_seen_tick: u64,
    pub last_seen_tick: u64,
}

impl From<&Track> for TrackSnapshot {
    fn from(t: &Track) -> Self {
        Self {
            track_id: t.track_id,
            class_label: t.class_label.clone(),
            kind_enum: t.kind_enum,
            pos_bucket: t.pos_bucket,
            dist_bucket: t.dist_bucket,
            visibility: t.visibility,
            threat_level: t.threat_level,
            confidence: t.confidence,
            p_unknown: t.p_unknown,
            first_seen_tick: t.first_seen_tick,
            last_seen_tick: t.last_seen_tick,
        }
    }
}

/// A saliency delta describing one track-level change.
///
/// `new_threat` must carry an embedded track payload; the producer enforces
/// this and drops violations (see the bus's `dropped_new_threat_count`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SaliencyEvent {
    /// A warmed-up track crossed into a threatening state.
    NewThreat {
        track_id: TrackId,
        /// Embedded track payload. `None` is a producer-side invariant
        /// violation and is filtered before emission.
        #[serde(skip_serializing_if = "Option::is_none")]
        track: Option<TrackSnapshot>,
    },
    /// An existing track changed bucket, visibility, or threat level.
    Updated {
        track_id: TrackId,
        visibility: Visibility,
        threat_level: ThreatLevel,
        dist_bucket: DistBucket,
    },
    /// A track aged out and left the set.
    Lost { track_id: TrackId },
}

impl SaliencyEvent {
    /// The track this delta refers to.
    pub fn track_id(&self) -> TrackId {
        match self {
            Self::NewThreat { track_id, .. }
            | Self::Updated { track_id, .. }
            | Self::Lost { track_id } => *track_id,
        }
    }

    /// Whether this delta satisfies the producer-side payload invariant.
    pub fn payload_well_formed(&self) -> bool {
        match self {
            Self::NewThreat { track, .. } => track.is_some(),
            Self::Updated { .. } | Self::Lost { .. } => true,
        }
    }
}

/// A complete, order-canonical view of the track set at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick_id: u64,
    /// Tracks sorted by track id.
    pub tracks: Vec<TrackSnapshot>,
}

impl Snapshot {
    pub fn new(tick_id: u64, mut tracks: Vec<TrackSnapshot>) -> Self {
        tracks.sort_by_key(|t| t.track_id);
        Self { tick_id, tracks }
    }
}

/// One out-going belief message.
///
/// Struct field order matches the wire field order; `serde_json` preserves
/// it on serialization, which is what makes envelopes byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub request_version: String,
    #[serde(rename = "type")]
    pub envelope_type: String,
    pub bot_id: String,
    pub stream_id: String,
    pub seq: u64,
    pub tick_id: u64,
    pub saliency_events: Vec<SaliencyEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

impl Envelope {
    pub fn new(bot_id: &str, stream_id: &str, seq: u64, tick_id: u64) -> Self {
        Self {
            request_version: REQUEST_VERSION.to_string(),
            envelope_type: ENVELOPE_TYPE.to_string(),
            bot_id: bot_id.to_string(),
            stream_id: stream_id.to_string(),
            seq,
            tick_id,
            saliency_events: Vec::new(),
            snapshot: None,
        }
    }

    /// Whether the envelope carries deltas or a snapshot.
    pub fn has_content(&self) -> bool {
        !self.saliency_events.is_empty() || self.snapshot.is_some()
    }

    /// Canonical wire bytes.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
