//! Turn events: the immutable record of one routing decision.
//!
//! A turn event is written exactly once; its event id doubles as the
//! idempotency key for every retry and replay path. Responder metadata is a
//! tagged union with an explicit size-checked serialization boundary: a blob
//! whose JSON form exceeds the cap is replaced by a stub that keeps the
//! always-needed scalar fields, and the full blob is stored out-of-line.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{EventId, SessionId, Timestamp};

use super::flow_state::{FitScore, LeadScore};
use super::stage::Stage;

/// Serialized metadata larger than this is stubbed out of the hot-path
/// record.
pub const METADATA_SIZE_CAP_BYTES: usize = 50_000;

/// Responder-specific metadata, one variant per responder family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnMetadata {
    Discovery {
        topics: Vec<String>,
    },
    Scoring {
        lead_score: LeadScore,
        fit_score: FitScore,
    },
    Pitch {
        pitch_type: String,
        talking_points: Vec<String>,
    },
    Objection {
        objection_count: u32,
        rebuttal_angle: Option<String>,
    },
    Closing {
        booking_link_sent: bool,
    },
    Summary {
        highlights: Vec<String>,
    },
    Admin {
        command: String,
    },
    Generic {
        notes: Option<String>,
    },
}

/// Scalar fields preserved when a metadata blob is stubbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataStub {
    #[serde(rename = "_oversized")]
    pub oversized: bool,
    pub stage: Stage,
    pub lead_score: Option<LeadScore>,
    pub fit_score: Option<FitScore>,
    pub multimodal_used: bool,
    pub original_size: usize,
    /// Cache key where the full blob was parked.
    pub blob_ref: String,
}

/// What actually lands in the hot-path record: the blob inline, or a stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRecord {
    Inline(TurnMetadata),
    Stub(MetadataStub),
}

impl MetadataRecord {
    pub fn is_stub(&self) -> bool {
        matches!(self, MetadataRecord::Stub(_))
    }
}

/// Scalars the stub must always keep, supplied by the persistence path.
#[derive(Debug, Clone, Copy)]
pub struct StubScalars {
    pub stage: Stage,
    pub lead_score: Option<LeadScore>,
    pub fit_score: Option<FitScore>,
    pub multimodal_used: bool,
}

/// Applies the size cap to a metadata blob.
///
/// Returns the record to embed plus, when stubbed, the full blob the caller
/// must store out-of-line under `blob_ref`.
pub fn cap_metadata(
    metadata: TurnMetadata,
    scalars: StubScalars,
    blob_ref: &str,
) -> (MetadataRecord, Option<TurnMetadata>) {
    let serialized_len = match serde_json::to_vec(&metadata) {
        Ok(bytes) => bytes.len(),
        // Unserializable metadata cannot go inline either; stub it.
        Err(_) => usize::MAX,
    };

    if serialized_len <= METADATA_SIZE_CAP_BYTES {
        return (MetadataRecord::Inline(metadata), None);
    }

    let stub = MetadataStub {
        oversized: true,
        stage: scalars.stage,
        lead_score: scalars.lead_score,
        fit_score: scalars.fit_score,
        multimodal_used: scalars.multimodal_used,
        original_size: serialized_len,
        blob_ref: blob_ref.to_string(),
    };
    (MetadataRecord::Stub(stub), Some(metadata))
}

/// One durable, idempotent record of a single routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub event_id: EventId,
    pub session_id: SessionId,
    pub responder: String,
    pub stage: Stage,
    pub multimodal_used: bool,
    pub metadata: MetadataRecord,
    pub created_at: Timestamp,
}

impl TurnEvent {
    /// Creates a new turn event with a fresh event id.
    pub fn new(
        session_id: SessionId,
        responder: impl Into<String>,
        stage: Stage,
        multimodal_used: bool,
        metadata: MetadataRecord,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            session_id,
            responder: responder.into(),
            stage,
            multimodal_used,
            metadata,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalars() -> StubScalars {
        StubScalars {
            stage: Stage::Pitching,
            lead_score: Some(LeadScore::new(70).unwrap()),
            fit_score: Some(FitScore::new(0.6, 0.4).unwrap()),
            multimodal_used: true,
        }
    }

    #[test]
    fn small_metadata_stays_inline() {
        let meta = TurnMetadata::Closing {
            booking_link_sent: true,
        };
        let (record, overflow) = cap_metadata(meta.clone(), scalars(), "ref");

        assert_eq!(record, MetadataRecord::Inline(meta));
        assert!(overflow.is_none());
    }

    #[test]
    fn oversized_metadata_becomes_stub_with_scalars() {
        // ~60kB of talking points pushes the blob past the cap.
        let meta = TurnMetadata::Pitch {
            pitch_type: "workshop".to_string(),
            talking_points: vec!["x".repeat(1000); 60],
        };
        let (record, overflow) = cap_metadata(meta.clone(), scalars(), "fallback:s1:e1");

        match record {
            MetadataRecord::Stub(stub) => {
                assert!(stub.oversized);
                assert_eq!(stub.stage, Stage::Pitching);
                assert_eq!(stub.lead_score.unwrap().value(), 70);
                assert_eq!(stub.fit_score.unwrap().workshop, 0.6);
                assert!(stub.multimodal_used);
                assert!(stub.original_size > METADATA_SIZE_CAP_BYTES);
                assert_eq!(stub.blob_ref, "fallback:s1:e1");
            }
            MetadataRecord::Inline(_) => panic!("expected stub"),
        }
        assert_eq!(overflow, Some(meta));
    }

    #[test]
    fn stub_serialization_carries_oversized_marker() {
        let meta = TurnMetadata::Summary {
            highlights: vec!["h".repeat(60_000)],
        };
        let (record, _) = cap_metadata(meta, scalars(), "ref");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"_oversized\":true"));
    }

    #[test]
    fn metadata_boundary_is_exact() {
        // A blob exactly at the cap stays inline.
        let meta = TurnMetadata::Generic { notes: None };
        let len = serde_json::to_vec(&meta).unwrap().len();
        assert!(len <= METADATA_SIZE_CAP_BYTES);
        let (record, _) = cap_metadata(meta, scalars(), "ref");
        assert!(!record.is_stub());
    }

    #[test]
    fn turn_event_generates_unique_ids() {
        let session = SessionId::new();
        let meta = MetadataRecord::Inline(TurnMetadata::Generic { notes: None });
        let a = TurnEvent::new(session, "discovery", Stage::Discovery, false, meta.clone());
        let b = TurnEvent::new(session, "discovery", Stage::Discovery, false, meta);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn turn_event_roundtrips_through_json() {
        let event = TurnEvent::new(
            SessionId::new(),
            "objection",
            Stage::Objection,
            false,
            MetadataRecord::Inline(TurnMetadata::Objection {
                objection_count: 2,
                rebuttal_angle: Some("roi".to_string()),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: TurnEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
