//! Entity belief bus.
//!
//! Ingests evidence batches, maintains a bounded track set, and emits
//! envelopes whose byte-exact content is a pure function of the evidence
//! stream and construction arguments. The bus is the sole mutator of the
//! track set; consumers receive immutable snapshots.

use std::collections::{BTreeMap, VecDeque};

use crate::domain::models::config::BeliefConfig;
use crate::domain::models::envelope::{Envelope, SaliencyEvent, Snapshot, TrackSnapshot};
use crate::domain::models::track::{
    EvidenceBatch, EvidenceItem, ThreatLevel, Track, TrackId, Visibility,
};

/// Per-track bookkeeping kept alongside the public track value.
#[derive(Debug, Clone)]
struct TrackState {
    track: Track,
    /// Consistent observations so far. Warmup completes at the second.
    observations: u32,
    /// Whether a `new_threat` delta has been emitted for this track.
    threat_reported: bool,
}

impl TrackState {
    fn warmed(&self) -> bool {
        self.observations >= 2
    }
}

/// Broad behavior class used by the threat policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassCategory {
    Hostile,
    Neutral,
    Harmless,
}

fn classify(class_label: &str) -> ClassCategory {
    match class_label {
        "zombie" | "skeleton" | "creeper" | "spider" | "witch" | "pillager" | "drowned"
        | "husk" | "stray" | "phantom" | "blaze" => ClassCategory::Hostile,
        "enderman" | "wolf" | "iron_golem" | "piglin" => ClassCategory::Neutral,
        _ => ClassCategory::Harmless,
    }
}

/// Threat policy table keyed on class category, distance bucket, and
/// visibility. Lost tracks always read as no threat.
fn threat_for(class_label: &str, dist_bucket: u8, visibility: Visibility) -> ThreatLevel {
    if visibility == Visibility::Lost {
        return ThreatLevel::None;
    }
    let visible = visibility == Visibility::Visible;
    match classify(class_label) {
        ClassCategory::Hostile => match dist_bucket {
            1 => {
                if visible {
                    ThreatLevel::Critical
                } else {
                    ThreatLevel::High
                }
            }
            2 => {
                if visible {
                    ThreatLevel::High
                } else {
                    ThreatLevel::Medium
                }
            }
            3 => {
                if visible {
                    ThreatLevel::Medium
                } else {
                    ThreatLevel::Low
                }
            }
            _ => {
                if visible {
                    ThreatLevel::Low
                } else {
                    ThreatLevel::None
                }
            }
        },
        ClassCategory::Neutral => {
            if visible && dist_bucket == 1 {
                ThreatLevel::Low
            } else {
                ThreatLevel::None
            }
        }
        ClassCategory::Harmless => ThreatLevel::None,
    }
}

/// Time-indexed track set with deterministic envelope emission.
pub struct BeliefBus {
    bot_id: String,
    stream_id: String,
    config: BeliefConfig,
    /// Ordered map so iteration order is deterministic.
    tracks: BTreeMap<TrackId, TrackState>,
    next_track_id: u64,
    current_tick: u64,
    /// Pending deltas in insertion order.
    pending: VecDeque<SaliencyEvent>,
    dropped_new_threat_count: u64,
    last_snapshot_tick: Option<u64>,
    force_snapshot_pending: bool,
}

impl BeliefBus {
    /// Construct a bus. The first envelope carries a forced snapshot.
    pub fn new(bot_id: impl Into<String>, stream_id: impl Into<String>, config: BeliefConfig) -> Self {
        Self {
            bot_id: bot_id.into(),
            stream_id: stream_id.into(),
            config,
            tracks: BTreeMap::new(),
            next_track_id: 0,
            current_tick: 0,
            pending: VecDeque::new(),
            dropped_new_threat_count: 0,
            last_snapshot_tick: None,
            force_snapshot_pending: true,
        }
    }

    /// Ingest one evidence batch: associate, create, age, and buffer deltas.
    pub fn ingest(&mut self, batch: &EvidenceBatch) {
        self.current_tick = self.current_tick.max(batch.tick_id);

        let mut matched: Vec<TrackId> = Vec::new();
        let mut unmatched_items: Vec<&EvidenceItem> = Vec::new();

        for item in &batch.items {
            match self.associate(item, &matched) {
                Some(track_id) => {
                    matched.push(track_id);
                    self.observe_existing(track_id, item);
                }
                None => unmatched_items.push(item),
            }
        }

        // Candidate tracks open in item order so id assignment is stable.
        for item in unmatched_items {
            let track_id = TrackId(self.next_track_id);
            self.next_track_id += 1;
            let track = Track::from_evidence(track_id, item, self.current_tick);
            self.tracks.insert(
                track_id,
                TrackState {
                    track,
                    observations: 1,
                    threat_reported: false,
                },
            );
        }

        self.age_and_flush_lost(&matched);
        self.recompute_threats(&matched);
    }

    /// Find the existing track this item belongs to, if any.
    ///
    /// Exact kind match, Chebyshev distance at most one bucket, lowest
    /// track id wins. Tracks already matched this batch are skipped so two
    /// items never collapse onto one track.
    fn associate(&self, item: &EvidenceItem, matched: &[TrackId]) -> Option<TrackId> {
        self.tracks
            .iter()
            .filter(|(id, state)| {
                !matched.contains(id)
                    && state.track.visibility != Visibility::Lost
                    && state.track.kind_enum == item.kind_enum
                    && state.track.pos_bucket.chebyshev(&item.pos_bucket) <= 1
            })
            .map(|(id, _)| *id)
            .next()
    }

    fn observe_existing(&mut self, track_id: TrackId, item: &EvidenceItem) {
        let Some(state) = self.tracks.get_mut(&track_id) else {
            return;
        };
        state.observations += 1;
        let track = &mut state.track;
        track.pos_bucket = item.pos_bucket;
        track.dist_bucket = item.dist_bucket;
        track.last_seen_tick = self.current_tick;
        track.visibility = Visibility::Visible;
        track.confidence = (track.confidence + 0.2).min(0.95);
        track.p_unknown = 1.0 - track.confidence;
    }

    /// Demote unseen tracks and drop the ones that age out. A track reaching
    /// the lost threshold emits a `lost` delta and leaves the set in this
    /// same tick's flush.
    fn age_and_flush_lost(&mut self, matched: &[TrackId]) {
        let mut lost: Vec<TrackId> = Vec::new();
        for (id, state) in &mut self.tracks {
            if matched.contains(id) {
                continue;
            }
            let age = state.track.age(self.current_tick);
            if age >= self.config.aging_lost_after {
                state.track.visibility = Visibility::Lost;
                lost.push(*id);
            } else if age >= self.config.aging_inferred_after {
                if state.track.visibility == Visibility::Visible {
                    state.track.visibility = Visibility::Inferred;
                    state.track.confidence = (state.track.confidence - 0.2).max(0.05);
                    state.track.p_unknown = 1.0 - state.track.confidence;
                    state.track.threat_level = threat_for(
                        &state.track.class_label,
                        state.track.dist_bucket,
                        Visibility::Inferred,
                    );
                    if state.warmed() {
                        let track = &state.track;
                        self.pending.push_back(SaliencyEvent::Updated {
                            track_id: *id,
                            visibility: track.visibility,
                            threat_level: track.threat_level,
                            dist_bucket: track.dist_bucket,
                        });
                    }
                }
            }
        }
        for id in lost {
            if let Some(state) = self.tracks.remove(&id) {
                if state.warmed() {
                    self.pending.push_back(SaliencyEvent::Lost { track_id: id });
                }
            }
        }
    }

    /// Recompute threat levels and buffer threat-transition deltas.
    fn recompute_threats(&mut self, matched: &[TrackId]) {
        let mut events: Vec<SaliencyEvent> = Vec::new();
        for (id, state) in &mut self.tracks {
            let track = &mut state.track;
            let new_level = threat_for(&track.class_label, track.dist_bucket, track.visibility);
            let old_level = track.threat_level;
            track.threat_level = new_level;

            if state.observations < 2 {
                continue;
            }

            let became_threatening = new_level > ThreatLevel::None && !state.threat_reported;
            if became_threatening {
                state.threat_reported = true;
                events.push(SaliencyEvent::NewThreat {
                    track_id: *id,
                    track: Some(TrackSnapshot::from(&*track)),
                });
            } else if new_level != old_level && matched.contains(id) {
                events.push(SaliencyEvent::Updated {
                    track_id: *id,
                    visibility: track.visibility,
                    threat_level: new_level,
                    dist_bucket: track.dist_bucket,
                });
            }
        }
        self.pending.extend(events);
    }

    /// Drain up to the per-emission cap, preserving insertion order.
    ///
    /// Producer-side invariant: a `new_threat` without an embedded track
    /// payload is dropped here, counted, and reported.
    pub fn flush_pending_deltas(&mut self) -> Vec<SaliencyEvent> {
        let cap = self.config.max_saliency_events_per_emission;
        let mut out = Vec::with_capacity(cap.min(self.pending.len()));
        while out.len() < cap {
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            if event.payload_well_formed() {
                out.push(event);
            } else {
                self.dropped_new_threat_count += 1;
                tracing::error!(
                    track_id = %event.track_id(),
                    dropped_total = self.dropped_new_threat_count,
                    "invariant violation: new_threat delta without track payload dropped"
                );
            }
        }
        out
    }

    /// Whether the next envelope must carry a snapshot.
    pub fn should_emit_snapshot(&self) -> bool {
        if self.force_snapshot_pending {
            return true;
        }
        match self.last_snapshot_tick {
            None => true,
            Some(last) => self.current_tick.saturating_sub(last) >= self.config.snapshot_interval_ticks,
        }
    }

    /// Request a snapshot in the next envelope regardless of cadence.
    pub fn force_snapshot(&mut self) {
        self.force_snapshot_pending = true;
    }

    /// Whether an envelope built now would carry any content.
    pub fn has_content(&self) -> bool {
        !self.pending.is_empty() || self.should_emit_snapshot()
    }

    /// Immutable, order-canonical view of the current track set.
    pub fn snapshot(&self) -> Snapshot {
        let tracks = self
            .tracks
            .values()
            .map(|state| TrackSnapshot::from(&state.track))
            .collect();
        Snapshot::new(self.current_tick, tracks)
    }

    /// Build the canonical envelope for this emission, consuming pending
    /// deltas (capped) and, when due, a snapshot.
    pub fn build_envelope(&mut self, seq: u64) -> Envelope {
        let mut envelope = Envelope::new(&self.bot_id, &self.stream_id, seq, self.current_tick);
        envelope.saliency_events = self.flush_pending_deltas();
        if self.should_emit_snapshot() {
            envelope.snapshot = Some(self.snapshot());
            self.last_snapshot_tick = Some(self.current_tick);
            self.force_snapshot_pending = false;
        }
        envelope
    }

    /// Count of malformed `new_threat` deltas filtered before emission.
    pub fn dropped_new_threat_count(&self) -> u64 {
        self.dropped_new_threat_count
    }

    /// Number of live tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Current tick as last advanced by ingest.
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    #[cfg(test)]
    fn inject_pending(&mut self, event: SaliencyEvent) {
        self.pending.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::track::PosBucket;

    fn bus() -> BeliefBus {
        BeliefBus::new("bot-1", "stream-1", BeliefConfig::default())
    }

    fn zombie_item(engine_id: u64) -> EvidenceItem {
        EvidenceItem::new(engine_id, "zombie", 3, 3)
    }

    #[test]
    fn test_warmup_suppresses_first_tick_threat() {
        let mut b = bus();
        b.ingest(&EvidenceBatch::with_items(1, vec![zombie_item(10)]));
        assert_eq!(b.flush_pending_deltas().len(), 0);

        b.ingest(&EvidenceBatch::with_items(2, vec![zombie_item(10)]));
        let deltas = b.flush_pending_deltas();
        assert_eq!(deltas.len(), 1);
        match &deltas[0] {
            SaliencyEvent::NewThreat { track, .. } => assert!(track.is_some()),
            other => panic!("expected new_threat, got {other:?}"),
        }
    }

    #[test]
    fn test_association_tolerates_bucket_wiggle() {
        let mut b = bus();
        let at_origin = zombie_item(10).with_pos(PosBucket::new(0, 0, 0));
        let one_over = zombie_item(99).with_pos(PosBucket::new(1, 0, 0));
        b.ingest(&EvidenceBatch::with_items(1, vec![at_origin]));
        b.ingest(&EvidenceBatch::with_items(2, vec![one_over]));
        assert_eq!(b.track_count(), 1);
    }

    #[test]
    fn test_far_same_kind_opens_second_track() {
        let mut b = bus();
        let near = zombie_item(10).with_pos(PosBucket::new(0, 0, 0));
        let far = zombie_item(11).with_pos(PosBucket::new(5, 0, 0));
        b.ingest(&EvidenceBatch::with_items(1, vec![near, far]));
        assert_eq!(b.track_count(), 2);
    }

    #[test]
    fn test_aging_demotes_then_drops() {
        let mut b = bus();
        b.ingest(&EvidenceBatch::with_items(1, vec![zombie_item(10)]));
        b.ingest(&EvidenceBatch::with_items(2, vec![zombie_item(10)]));
        b.flush_pending_deltas();

        // Unseen for K1 ticks: inferred.
        b.ingest(&EvidenceBatch::new(5));
        let snap = b.snapshot();
        assert_eq!(snap.tracks[0].visibility, Visibility::Inferred);

        // Unseen past K2: lost and dropped in the same tick's flush.
        b.ingest(&EvidenceBatch::new(12));
        assert_eq!(b.track_count(), 0);
        let deltas = b.flush_pending_deltas();
        assert!(deltas
            .iter()
            .any(|d| matches!(d, SaliencyEvent::Lost { .. })));
    }

    #[test]
    fn test_delta_cap_preserves_overflow() {
        let config = BeliefConfig {
            max_saliency_events_per_emission: 2,
            ..BeliefConfig::default()
        };
        let mut b = BeliefBus::new("bot-1", "stream-1", config);
        // Five distinct hostiles, all warmed on the second tick.
        let items: Vec<EvidenceItem> = (0..5)
            .map(|i| zombie_item(i).with_pos(PosBucket::new(i as i32 * 10, 0, 0)))
            .collect();
        b.ingest(&EvidenceBatch::with_items(1, items.clone()));
        b.ingest(&EvidenceBatch::with_items(2, items));

        let first = b.flush_pending_deltas();
        assert_eq!(first.len(), 2);
        let second = b.flush_pending_deltas();
        assert_eq!(second.len(), 2);
        let third = b.flush_pending_deltas();
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_malformed_new_threat_dropped_and_counted() {
        let mut b = bus();
        b.inject_pending(SaliencyEvent::NewThreat {
            track_id: TrackId(7),
            track: None,
        });
        let deltas = b.flush_pending_deltas();
        assert!(deltas.is_empty());
        assert_eq!(b.dropped_new_threat_count(), 1);
    }

    #[test]
    fn test_snapshot_forced_on_construction() {
        let mut b = bus();
        assert!(b.should_emit_snapshot());
        let envelope = b.build_envelope(0);
        assert!(envelope.snapshot.is_some());
        // Cadence not yet elapsed and no deltas: empty envelope.
        let empty = b.build_envelope(1);
        assert!(!empty.has_content());
    }

    #[test]
    fn test_snapshot_cadence() {
        let config = BeliefConfig {
            snapshot_interval_ticks: 4,
            ..BeliefConfig::default()
        };
        let mut b = BeliefBus::new("bot-1", "stream-1", config);
        b.build_envelope(0);
        b.ingest(&EvidenceBatch::new(3));
        assert!(!b.should_emit_snapshot());
        b.ingest(&EvidenceBatch::new(4));
        assert!(b.should_emit_snapshot());
    }

    #[test]
    fn test_force_snapshot() {
        let mut b = bus();
        b.build_envelope(0);
        assert!(!b.should_emit_snapshot());
        b.force_snapshot();
        assert!(b.should_emit_snapshot());
    }

    #[test]
    fn test_envelope_determinism_across_instances() {
        let mut a = bus();
        let mut b = bus();
        for tick in 1..=6 {
            let batch = EvidenceBatch::with_items(
                tick,
                vec![
                    zombie_item(10),
                    EvidenceItem::new(20, "creeper", 4, 1).with_pos(PosBucket::new(3, 0, 0)),
                ],
            );
            a.ingest(&batch);
            b.ingest(&batch);
            let ea = a.build_envelope(tick).to_wire_bytes().unwrap();
            let eb = b.build_envelope(tick).to_wire_bytes().unwrap();
            assert_eq!(ea, eb);
        }
    }

    #[test]
    fn test_threat_policy_table() {
        assert_eq!(
            threat_for("creeper", 1, Visibility::Visible),
            ThreatLevel::Critical
        );
        assert_eq!(
            threat_for("zombie", 2, Visibility::Inferred),
            ThreatLevel::Medium
        );
        assert_eq!(
            threat_for("zombie", 3, Visibility::Visible),
            ThreatLevel::Medium
        );
        assert_eq!(threat_for("cow", 1, Visibility::Visible), ThreatLevel::None);
        assert_eq!(
            threat_for("creeper", 1, Visibility::Lost),
            ThreatLevel::None
        );
        assert_eq!(
            threat_for("wolf", 1, Visibility::Visible),
            ThreatLevel::Low
        );
    }
}
