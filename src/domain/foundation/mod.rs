//! Foundation layer: shared value objects and error taxonomy.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{EventId, SessionId};
pub use timestamp::Timestamp;
