//! Exit and objection detectors.
//!
//! Pure pattern classifiers over the trailing detector window. Only the most
//! recent user message is inspected for intent keywords; agent messages never
//! trigger a detection. Confidence values are fixed per category, not
//! learned. The exit-attempt counter lives in the flow state and is
//! incremented by the router, so detection here stays side-effect free.

use once_cell::sync::Lazy;

use super::message::{Message, Role};

/// Fixed confidence reported for a booking intent match.
pub const BOOKING_CONFIDENCE: f64 = 0.9;
/// Fixed confidence reported for a wrap-up intent match.
pub const WRAP_UP_CONFIDENCE: f64 = 0.8;
/// Fixed confidence reported for a frustration match.
pub const FRUSTRATION_CONFIDENCE: f64 = 0.95;

/// Result of a single detector pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub matched: bool,
    pub confidence: f64,
}

impl Detection {
    fn hit(confidence: f64) -> Self {
        Self {
            matched: true,
            confidence,
        }
    }

    fn miss() -> Self {
        Self {
            matched: false,
            confidence: 0.0,
        }
    }
}

static BOOKING_PATTERNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "book a call",
        "book a meeting",
        "book the workshop",
        "schedule a call",
        "schedule a meeting",
        "set up a call",
        "calendar link",
        "send me an invite",
        "let's book",
        "ready to book",
    ]
});

static WRAP_UP_PATTERNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "wrap up",
        "wrap this up",
        "that's all",
        "thats all",
        "that is all for",
        "gotta go",
        "have to go",
        "have to run",
        "talk later",
        "goodbye",
        "bye for now",
    ]
});

static FRUSTRATION_PATTERNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "this is useless",
        "this is pointless",
        "not helping",
        "stop asking",
        "you already asked",
        "waste of time",
        "wasting my time",
        "so frustrating",
        "really annoying",
        "leave me alone",
    ]
});

static OBJECTION_PATTERNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "too expensive",
        "can't afford",
        "cant afford",
        "no budget",
        "over budget",
        "need to think about it",
        "talk to my team",
        "talk to my boss",
        "not convinced",
        "why should i",
        "already have a provider",
        "already working with",
        "not the right time",
    ]
});

/// Admin commands are addressed with a leading slash.
const ADMIN_TRIGGER: &str = "/admin";

fn last_user_text(window: &[Message]) -> Option<String> {
    window
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.to_lowercase())
}

fn matches_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

/// Detects explicit booking intent in the latest user message.
pub fn detect_booking(window: &[Message]) -> Detection {
    match last_user_text(window) {
        Some(text) if matches_any(&text, &BOOKING_PATTERNS) => {
            Detection::hit(BOOKING_CONFIDENCE)
        }
        _ => Detection::miss(),
    }
}

/// Detects wrap-up intent in the latest user message.
pub fn detect_wrap_up(window: &[Message]) -> Detection {
    match last_user_text(window) {
        Some(text) if matches_any(&text, &WRAP_UP_PATTERNS) => {
            Detection::hit(WRAP_UP_CONFIDENCE)
        }
        _ => Detection::miss(),
    }
}

/// Detects frustration in the latest user message.
pub fn detect_frustration(window: &[Message]) -> Detection {
    match last_user_text(window) {
        Some(text) if matches_any(&text, &FRUSTRATION_PATTERNS) => {
            Detection::hit(FRUSTRATION_CONFIDENCE)
        }
        _ => Detection::miss(),
    }
}

/// Detects a sales objection in the latest user message. Boolean only.
pub fn detect_objection(window: &[Message]) -> bool {
    match last_user_text(window) {
        Some(text) => matches_any(&text, &OBJECTION_PATTERNS),
        None => false,
    }
}

/// Detects the admin trigger phrase at the start of the latest user message.
pub fn detect_admin_trigger(window: &[Message]) -> bool {
    match last_user_text(window) {
        Some(text) => text.trim_start().starts_with(ADMIN_TRIGGER),
        None => false,
    }
}
