//! Context assembly: everything a responder needs for one turn.
//!
//! Reads the session record from the durable store and pairs it with the
//! best usable evidence from the process-local buffer. Evidence buffers are
//! kept per session and never persisted; losing one on restart only costs
//! recent frames, not correctness.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::evidence::{EvidenceBuffer, EvidenceItem, Frame, ScoredFrame, REJECTION_THRESHOLD};
use crate::domain::foundation::SessionId;
use crate::domain::funnel::SessionSnapshot;
use crate::ports::{SessionStore, StoreError};

/// Input bundle for one router pass and responder invocation.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub snapshot: SessionSnapshot,
    /// Best evidence that cleared the quality gate, if any.
    pub evidence: Option<EvidenceItem>,
}

/// Builds [`ContextBundle`]s from the store and the evidence buffers.
pub struct ContextAssembler {
    store: Arc<dyn SessionStore>,
    buffers: Mutex<HashMap<SessionId, EvidenceBuffer>>,
    rejection_threshold: f64,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_threshold(store, REJECTION_THRESHOLD)
    }

    /// An assembler whose buffers gate on a configured rejection threshold.
    pub fn with_threshold(store: Arc<dyn SessionStore>, rejection_threshold: f64) -> Self {
        Self {
            store,
            buffers: Mutex::new(HashMap::new()),
            rejection_threshold,
        }
    }

    /// Scores an incoming frame and admits it to the session's buffer.
    /// Rejected frames are buffered too; the quality gate applies at
    /// selection time.
    pub async fn ingest_frame(&self, session_id: SessionId, frame: Frame) -> ScoredFrame {
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers
            .entry(session_id)
            .or_insert_with(|| EvidenceBuffer::with_threshold(self.rejection_threshold));
        let scored = buffer.push(frame);
        tracing::debug!(
            %session_id,
            quality = scored.quality,
            confidence = scored.confidence,
            usable = scored.is_usable(),
            "evidence frame scored"
        );
        scored
    }

    /// Assembles the context for one turn. A session never written reads as
    /// a fresh snapshot; store errors surface to the caller unchanged.
    pub async fn assemble(&self, session_id: SessionId) -> Result<ContextBundle, StoreError> {
        let snapshot = match self.store.get(&session_id).await? {
            Some(record) => SessionSnapshot {
                session_id,
                stage: record.stage,
                flow_state: record.flow_state,
            },
            None => SessionSnapshot::fresh(session_id),
        };

        let evidence = {
            let buffers = self.buffers.lock().await;
            buffers
                .get(&session_id)
                .and_then(|buffer| buffer.best_usable())
                .map(ScoredFrame::to_item)
        };

        Ok(ContextBundle { snapshot, evidence })
    }

    /// Drops the buffer for a finished session.
    pub async fn evict_session(&self, session_id: &SessionId) {
        self.buffers.lock().await.remove(session_id);
    }
}
