//! Fixed-capacity evidence buffer with best-frame selection.
//!
//! The buffer is a transient, per-connection cache: capacity 5, strict FIFO
//! eviction by capture order. Sub-threshold frames are retained so a later,
//! better frame can still win the window, but they are never forwarded into
//! conversation context.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::scorer::{self, Frame, Modality, REJECTION_THRESHOLD};

/// Maximum number of frames retained per connection.
pub const BUFFER_CAPACITY: usize = 5;

/// A frame with its capture-time scores attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFrame {
    pub frame: Frame,
    pub quality: f64,
    pub confidence: f64,
    /// Whether quality cleared the rejection threshold in force when the
    /// frame was scored.
    pub usable: bool,
}

impl ScoredFrame {
    /// Scores a raw frame against the default rejection threshold.
    pub fn score(frame: Frame) -> Self {
        Self::score_against(frame, REJECTION_THRESHOLD)
    }

    /// Scores a raw frame against a configured rejection threshold.
    pub fn score_against(frame: Frame, threshold: f64) -> Self {
        let quality = scorer::quality(&frame);
        let confidence = scorer::confidence(&frame);
        Self {
            frame,
            quality,
            confidence,
            usable: quality >= threshold,
        }
    }

    /// Whether this frame may be forwarded into conversation context.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    /// Converts to the persisted evidence form.
    pub fn to_item(&self) -> EvidenceItem {
        EvidenceItem {
            payload_ref: self.frame.payload_ref.clone(),
            modality: self.frame.modality,
            quality: self.quality,
            confidence: self.confidence,
            captured_at: self.frame.captured_at,
        }
    }
}

/// A scored observation as it appears in the session's multimodal history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub payload_ref: String,
    pub modality: Modality,
    pub quality: f64,
    pub confidence: f64,
    pub captured_at: Timestamp,
}

/// Ring buffer of recently captured frames.
#[derive(Debug)]
pub struct EvidenceBuffer {
    frames: VecDeque<ScoredFrame>,
    threshold: f64,
}

impl Default for EvidenceBuffer {
    fn default() -> Self {
        Self::with_threshold(REJECTION_THRESHOLD)
    }
}

impl EvidenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer whose quality gate uses a configured threshold instead of
    /// the default.
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            frames: VecDeque::new(),
            threshold,
        }
    }

    /// Scores and stores a frame, evicting the oldest past capacity.
    /// Returns the scored frame.
    pub fn push(&mut self, frame: Frame) -> ScoredFrame {
        let scored = ScoredFrame::score_against(frame, self.threshold);
        if self.frames.len() == BUFFER_CAPACITY {
            self.frames.pop_front();
        }
        self.frames.push_back(scored.clone());
        scored
    }

    /// Argmax-quality frame across current contents, regardless of
    /// threshold.
    pub fn best(&self) -> Option<&ScoredFrame> {
        self.frames
            .iter()
            .max_by(|a, b| a.quality.total_cmp(&b.quality))
    }

    /// Best frame that clears the rejection threshold; this is what may be
    /// forwarded into conversation context.
    pub fn best_usable(&self) -> Option<&ScoredFrame> {
        self.best().filter(|f| f.is_usable())
    }

    /// Selection entry point for a freshly captured frame.
    ///
    /// An empty buffer uses the current frame unconditionally — there is
    /// nothing else available, so no threshold check applies. Otherwise the
    /// buffer argmax wins.
    pub fn select_with_current(&self, current: Frame) -> ScoredFrame {
        match self.best() {
            Some(best) => best.clone(),
            None => ScoredFrame::score_against(current, self.threshold),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
