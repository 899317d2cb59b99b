//! Pitchflow - Sales Funnel Conversation Engine
//!
//! This crate orchestrates a multi-turn sales conversation through a bounded
//! set of funnel stages, persisting every routing decision with optimistic
//! concurrency so a session survives crashes, reloads, and duplicate requests.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
