//! In-memory session store.
//!
//! Backs unit and integration tests, and local development without
//! Postgres. Implements the exact conditional-write contract of the port,
//! including create-at-version-zero and the idempotent no-op for replayed
//! event ids.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::SessionId;
use crate::ports::{SessionPatch, SessionRecord, SessionStore, StoreError, Version};

#[derive(Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn write_if_version(
        &self,
        session_id: &SessionId,
        expected: Version,
        patch: SessionPatch,
    ) -> Result<Version, StoreError> {
        let mut records = self.records.write().await;

        let record = records
            .entry(*session_id)
            .or_insert_with(|| SessionRecord::fresh(*session_id));

        if record.has_applied(&patch.event.event_id) {
            return Ok(record.version);
        }

        if record.version != expected {
            let current = record.version;
            // Do not leave an empty record behind for a failed create.
            if current == 0 {
                records.remove(session_id);
            }
            return Err(StoreError::VersionConflict { expected, current });
        }

        record.apply(&patch);
        Ok(record.version)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.records.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::funnel::{
        ConversationFlowState, MetadataRecord, Stage, TurnEvent, TurnMetadata,
    };

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
        // Both writers observe an absent record and race the create; the
        // loser must conflict, not clobber the winner's row.
        let store = std::sync::Arc::new(InMemorySessionStore::new());
        let session = SessionId::new();

        let a = store.clone();
        let b = store.clone();
        let (first, second) = tokio::join!(
            a.write_if_version(&session, 0, patch_for(session, Stage::Discovery)),
            b.write_if_version(&session, 0, patch_for(session, Stage::Pitching)),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, Err(StoreError::VersionConflict { current: 1, .. }))));

        // The surviving record is the winner's, at version 1.
        assert_eq!(store.get(&session).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn expected_zero_creates_the_record() {
        let store = InMemorySessionStore::new();
        let session = SessionId::new();

        let version = store
            .write_if_version(&session, 0, patch_for(session, Stage::Discovery))
            .await
            .unwrap();

        assert_eq!(version, 1);
        assert_eq!(store.get(&session).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let store = InMemorySessionStore::new();
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
        // The losing write changed nothing.
        assert_eq!(store.get(&session).await.unwrap().unwrap().stage, Stage::Discovery);
    }

    #[tokio::test]
    async fn failed_create_leaves_no_record() {
        let store = InMemorySessionStore::new();
        let session = SessionId::new();

        let err = store
            .write_if_version(&session, 3, patch_for(session, Stage::Discovery))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::VersionConflict { current: 0, .. }));
        assert!(store.get(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replayed_event_id_is_a_no_op() {
        let store = InMemorySessionStore::new();
        let session = SessionId::new();
        let p = patch_for(session, Stage::Discovery);

        store.write_if_version(&session, 0, p.clone()).await.unwrap();
        // Same event id, even with a stale expected version.
        let version = store.write_if_version(&session, 0, p).await.unwrap();

        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = InMemorySessionStore::new();
        let session = SessionId::new();
        store
            .write_if_version(&session, 0, patch_for(session, Stage::Discovery))
            .await
            .unwrap();

        store.delete(&session).await.unwrap();
        assert!(store.get(&session).await.unwrap().is_none());
    }
}
