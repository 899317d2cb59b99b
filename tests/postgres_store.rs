//! Conditional-write contract tests against a live PostgreSQL server.
//!
//! These exercise the production store, not the in-memory double, because
//! the create path has no row to lock: correctness there rests on the
//! guarded upsert. Set DATABASE_URL to run them; without it each test
//! returns early.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use pitchflow::adapters::PostgresSessionStore;
use pitchflow::domain::foundation::SessionId;
use pitchflow::domain::funnel::{
    ConversationFlowState, MetadataRecord, Stage, TurnEvent, TurnMetadata,
};
use pitchflow::ports::{SessionPatch, SessionStore, StoreError};

async fn store_from_env() -> Option<PostgresSessionStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    Some(PostgresSessionStore::new(pool))
}

fn patch_for(session_id: SessionId, stage: Stage) -> SessionPatch {
    SessionPatch {
        stage,
        flow_state: ConversationFlowState::new(),
        event: TurnEvent::new(
            session_id,
            "discovery",
            stage,
            false,
            MetadataRecord::Inline(TurnMetadata::Generic { notes: None }),
        ),
        evidence: None,
    }
}

#[tokio::test]
async fn concurrent_creates_admit_exactly_one() {
    let Some(store) = store_from_env().await else {
        return;
    };
    let store = Arc::new(store);
    let session = SessionId::new();

    let winner_patch = patch_for(session, Stage::Discovery);
    let loser_patch = patch_for(session, Stage::Pitching);
    let winner_event = winner_patch.event.event_id;
    let loser_event = loser_patch.event.event_id;

    let a = store.clone();
    let b = store.clone();
    let (first, second) = tokio::join!(
        a.write_if_version(&session, 0, winner_patch),
        b.write_if_version(&session, 0, loser_patch),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, Err(StoreError::VersionConflict { expected: 0, current: 1 }))));

    // The committed row belongs to whichever create landed, at version 1,
    // with exactly that event in the idempotency window.
    let record = store.get(&session).await.unwrap().unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.applied_events.len(), 1);
    let survivor = record.applied_events[0];
    assert!(survivor == winner_event || survivor == loser_event);
}

#[tokio::test]
async fn stale_writer_cannot_overwrite_a_committed_row() {
    let Some(store) = store_from_env().await else {
        return;
    };
    let session = SessionId::new();

    store
        .write_if_version(&session, 0, patch_for(session, Stage::Discovery))
        .await
        .unwrap();

    let err = store
        .write_if_version(&session, 0, patch_for(session, Stage::Pitching))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionConflict {
            expected: 0,
            current: 1
        }
    ));

    let record = store.get(&session).await.unwrap().unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.stage, Stage::Discovery);
}

#[tokio::test]
async fn evidence_history_survives_the_roundtrip() {
    let Some(store) = store_from_env().await else {
        return;
    };
    let session = SessionId::new();

    let mut patch = patch_for(session, Stage::Discovery);
    patch.evidence = Some(pitchflow::domain::evidence::EvidenceItem {
        payload_ref: "frame-1".to_string(),
        modality: pitchflow::domain::evidence::Modality::Screen,
        quality: 0.9,
        confidence: 0.6,
        captured_at: pitchflow::domain::foundation::Timestamp::now(),
    });
    store.write_if_version(&session, 0, patch).await.unwrap();

    store
        .write_if_version(&session, 1, patch_for(session, Stage::Pitching))
        .await
        .unwrap();

    let record = store.get(&session).await.unwrap().unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.evidence.len(), 1);
    assert_eq!(record.evidence[0].payload_ref, "frame-1");
}
