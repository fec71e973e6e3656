//! Registration engine for the healthcare provider portal.
//!
//! Providers fill a multi-step registration form that is autosaved as a draft while they
//! type; once submitted, administrators review the resulting registration. The modules
//! below hold the pure form progress engine, the debounced draft autosave, and the
//! review workflow, with every backend collaborator expressed as a trait.

pub mod access;
pub mod config;
pub mod documents;
pub mod error;
pub mod registration;
pub mod telemetry;
