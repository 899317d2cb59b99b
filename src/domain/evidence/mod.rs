//! Evidence domain: multimodal quality scoring and the capture buffer.

mod buffer;
pub mod scorer;

pub use buffer::{EvidenceBuffer, EvidenceItem, ScoredFrame, BUFFER_CAPACITY};
pub use scorer::{Frame, FrameStats, Modality, REJECTION_THRESHOLD};
