//! Domain layer: pure business logic, no infrastructure knowledge.

pub mod evidence;
pub mod foundation;
pub mod funnel;
