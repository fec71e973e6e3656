//! Provider registration: the multi-step form model, its progress engine, draft autosave,
//! and the submission/review workflow.

pub mod autosave;
pub mod draft;
pub mod form;
pub mod progress;
pub mod router;
pub mod rules;
pub mod submission;
pub mod validity;
pub mod values;

pub use autosave::{
    AutosaveError, AutosaveSettings, DraftSyncController, Notification, Notifier,
    ResponseOrdering,
};
pub use draft::{Draft, DraftCache, DraftId, DraftStore, DraftStoreError, DraftUpsert};
pub use form::{
    load_steps, provider_registration_rules, provider_registration_steps, FormLoadError,
    FormStep, FormSubsection,
};
pub use progress::{compute_progress, progress_breakdown, ProgressBreakdown, StepProgress};
pub use router::{registration_router, PortalState};
pub use rules::{FieldRule, RuleSet};
pub use submission::{
    Registration, RegistrationError, RegistrationNumber, RegistrationRepository,
    RegistrationService, RegistrationStatus, RepositoryError,
};
pub use validity::{evaluate, SubsectionResult};
pub use values::{FormErrors, FormState, FormValues};

#[cfg(test)]
mod tests;
