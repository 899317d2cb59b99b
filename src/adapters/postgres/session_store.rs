//! PostgreSQL implementation of the session store.
//!
//! The session row carries the version column the optimistic write checks,
//! plus the bounded applied-events window. Turn events land in their own
//! append-only table; `ON CONFLICT DO NOTHING` on the event id makes the
//! event insert idempotent independently of the window.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::evidence::EvidenceItem;
use crate::domain::foundation::{SessionId, Timestamp};
use crate::domain::funnel::{ConversationFlowState, Stage};
use crate::ports::{
    SessionPatch, SessionRecord, SessionStore, StoreError, Version, APPLIED_EVENTS_WINDOW,
};

/// PostgreSQL implementation of [`SessionStore`].
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Re-reads the committed version after a guarded upsert touched no
    /// rows, so the conflict error carries what the caller lost to.
    async fn current_version(&self, session_id: &SessionId) -> Result<Version, StoreError> {
        let row = sqlx::query("SELECT version FROM sessions WHERE id = $1")
            .bind(session_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to fetch version: {}", e)))?;

        match row {
            Some(row) => {
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| StoreError::Unavailable(format!("failed to get version: {}", e)))?;
                Ok(version as Version)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, version, stage, flow_state, applied_events, evidence, updated_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to fetch session: {}", e)))?;

        match row {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    async fn write_if_version(
        &self,
        session_id: &SessionId,
        expected: Version,
        patch: SessionPatch,
    ) -> Result<Version, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to begin transaction: {}", e)))?;

        let row = sqlx::query(
            r#"
            SELECT version, applied_events, evidence
            FROM sessions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to lock session: {}", e)))?;

        let (current, mut applied, mut evidence): (Version, Vec<uuid::Uuid>, Vec<EvidenceItem>) =
            match row {
                Some(row) => {
                    let version: i64 = row.try_get("version").map_err(|e| {
                        StoreError::Unavailable(format!("failed to get version: {}", e))
                    })?;
                    let applied: Vec<uuid::Uuid> = row.try_get("applied_events").map_err(|e| {
                        StoreError::Unavailable(format!("failed to get applied_events: {}", e))
                    })?;
                    let evidence_json: serde_json::Value =
                        row.try_get("evidence").map_err(|e| {
                            StoreError::Unavailable(format!("failed to get evidence: {}", e))
                        })?;
                    let evidence: Vec<EvidenceItem> = serde_json::from_value(evidence_json)
                        .map_err(|e| {
                            StoreError::Unavailable(format!("failed to decode evidence: {}", e))
                        })?;
                    (version as Version, applied, evidence)
                }
                None => (0, Vec::new(), Vec::new()),
            };

        if applied.contains(patch.event.event_id.as_uuid()) {
            tx.rollback()
                .await
                .map_err(|e| StoreError::Unavailable(format!("failed to rollback: {}", e)))?;
            return Ok(current);
        }

        if current != expected {
            tx.rollback()
                .await
                .map_err(|e| StoreError::Unavailable(format!("failed to rollback: {}", e)))?;
            return Err(StoreError::VersionConflict { expected, current });
        }

        let new_version = current + 1;
        applied.push(*patch.event.event_id.as_uuid());
        if applied.len() > APPLIED_EVENTS_WINDOW {
            let excess = applied.len() - APPLIED_EVENTS_WINDOW;
            applied.drain(..excess);
        }
        if let Some(item) = &patch.evidence {
            evidence.push(item.clone());
        }

        let flow_state = serde_json::to_value(&patch.flow_state)
            .map_err(|e| StoreError::Unavailable(format!("failed to encode flow state: {}", e)))?;
        let evidence_json = serde_json::to_value(&evidence)
            .map_err(|e| StoreError::Unavailable(format!("failed to encode evidence: {}", e)))?;
        let now = Timestamp::now();

        // The upsert re-checks the version. A missing row takes no FOR
        // UPDATE lock, so two creators can both observe version 0; the
        // conflict guard below makes the loser's update a no-op instead of
        // letting it clobber the winner's committed row.
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (id, version, stage, flow_state, applied_events, evidence, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                stage = EXCLUDED.stage,
                flow_state = EXCLUDED.flow_state,
                applied_events = EXCLUDED.applied_events,
                evidence = EXCLUDED.evidence,
                updated_at = EXCLUDED.updated_at
            WHERE sessions.version = $8
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(new_version as i64)
        .bind(stage_to_str(patch.stage))
        .bind(&flow_state)
        .bind(&applied)
        .bind(&evidence_json)
        .bind(now.as_datetime())
        .bind(expected as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to write session: {}", e)))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| StoreError::Unavailable(format!("failed to rollback: {}", e)))?;
            let current = self.current_version(session_id).await?;
            return Err(StoreError::VersionConflict { expected, current });
        }

        let metadata = serde_json::to_value(&patch.event.metadata)
            .map_err(|e| StoreError::Unavailable(format!("failed to encode metadata: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO turn_events (
                event_id, session_id, responder, stage, multimodal_used, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(patch.event.event_id.as_uuid())
        .bind(patch.event.session_id.as_uuid())
        .bind(&patch.event.responder)
        .bind(stage_to_str(patch.event.stage))
        .bind(patch.event.multimodal_used)
        .bind(&metadata)
        .bind(patch.event.created_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to write turn event: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to commit: {}", e)))?;

        Ok(new_version)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to delete session: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(*session_id));
        }

        Ok(())
    }
}

fn stage_to_str(stage: Stage) -> &'static str {
    match stage {
        Stage::Discovery => "discovery",
        Stage::Scoring => "scoring",
        Stage::IntelligenceGathering => "intelligence_gathering",
        Stage::WorkshopPitch => "workshop_pitch",
        Stage::ConsultingPitch => "consulting_pitch",
        Stage::Pitching => "pitching",
        Stage::Proposal => "proposal",
        Stage::Objection => "objection",
        Stage::Closing => "closing",
        Stage::BookingRequested => "booking_requested",
        Stage::Booked => "booked",
        Stage::Summary => "summary",
        Stage::Retargeting => "retargeting",
        Stage::Admin => "admin",
        Stage::ForceExit => "force_exit",
    }
}

fn str_to_stage(s: &str) -> Result<Stage, StoreError> {
    match s {
        "discovery" => Ok(Stage::Discovery),
        "scoring" => Ok(Stage::Scoring),
        "intelligence_gathering" => Ok(Stage::IntelligenceGathering),
        "workshop_pitch" => Ok(Stage::WorkshopPitch),
        "consulting_pitch" => Ok(Stage::ConsultingPitch),
        "pitching" => Ok(Stage::Pitching),
        "proposal" => Ok(Stage::Proposal),
        "objection" => Ok(Stage::Objection),
        "closing" => Ok(Stage::Closing),
        "booking_requested" => Ok(Stage::BookingRequested),
        "booked" => Ok(Stage::Booked),
        "summary" => Ok(Stage::Summary),
        "retargeting" => Ok(Stage::Retargeting),
        "admin" => Ok(Stage::Admin),
        "force_exit" => Ok(Stage::ForceExit),
        _ => Err(StoreError::Unavailable(format!("invalid stage: {}", s))),
    }
}

fn row_to_record(row: sqlx::postgres::PgRow) -> Result<SessionRecord, StoreError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| StoreError::Unavailable(format!("failed to get id: {}", e)))?;

    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::Unavailable(format!("failed to get version: {}", e)))?;

    let stage_str: String = row
        .try_get("stage")
        .map_err(|e| StoreError::Unavailable(format!("failed to get stage: {}", e)))?;
    let stage = str_to_stage(&stage_str)?;

    let flow_state_json: serde_json::Value = row
        .try_get("flow_state")
        .map_err(|e| StoreError::Unavailable(format!("failed to get flow_state: {}", e)))?;
    let flow_state: ConversationFlowState = serde_json::from_value(flow_state_json)
        .map_err(|e| StoreError::Unavailable(format!("failed to decode flow state: {}", e)))?;

    let applied: Vec<uuid::Uuid> = row
        .try_get("applied_events")
        .map_err(|e| StoreError::Unavailable(format!("failed to get applied_events: {}", e)))?;

    let evidence_json: serde_json::Value = row
        .try_get("evidence")
        .map_err(|e| StoreError::Unavailable(format!("failed to get evidence: {}", e)))?;
    let evidence: Vec<EvidenceItem> = serde_json::from_value(evidence_json)
        .map_err(|e| StoreError::Unavailable(format!("failed to decode evidence: {}", e)))?;

    let updated_at: chrono::DateTime<chrono::Utc> = row
        .try_get("updated_at")
        .map_err(|e| StoreError::Unavailable(format!("failed to get updated_at: {}", e)))?;

    Ok(SessionRecord {
        session_id: SessionId::from_uuid(id),
        version: version as Version,
        stage,
        flow_state,
        applied_events: applied
            .into_iter()
            .map(crate::domain::foundation::EventId::from_uuid)
            .collect(),
        evidence,
        updated_at: Timestamp::from_datetime(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_conversion_roundtrips() {
        for stage in Stage::all() {
            assert_eq!(str_to_stage(stage_to_str(stage)).unwrap(), stage);
        }
    }

    #[test]
    fn str_to_stage_rejects_invalid() {
        assert!(str_to_stage("unknown").is_err());
    }
}
