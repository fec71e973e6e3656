use crate::infra::{CollectingNotifier, InMemoryDraftStore};
use clap::Args;
use provider_portal::access::{StaticIdentity, UserId};
use provider_portal::config::AppConfig;
use provider_portal::error::AppError;
use provider_portal::registration::{
    load_steps, progress_breakdown, provider_registration_rules, provider_registration_steps,
    AutosaveError, AutosaveSettings, Draft, DraftCache, DraftSyncController, FormErrors,
    FormLoadError, FormState, FormValues, Notification, ProgressBreakdown,
};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Args, Debug)]
pub(crate) struct ProgressArgs {
    /// JSON object of form values keyed by field path
    #[arg(long)]
    pub(crate) values: PathBuf,
    /// JSON object of field errors; the standard rules run when omitted
    #[arg(long)]
    pub(crate) errors: Option<PathBuf>,
    /// Custom step definition file; defaults to the provider registration flow
    #[arg(long)]
    pub(crate) steps: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AutosaveArgs {
    /// JSON array of `{ "at_ms", "path", "value" }` edits
    #[arg(long)]
    pub(crate) events: PathBuf,
    /// Signed-in user; omit to replay as a signed-out visitor
    #[arg(long)]
    pub(crate) user: Option<String>,
}

/// One keystroke-level edit, applied `at_ms` after the replay starts.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EditEvent {
    pub(crate) at_ms: u64,
    pub(crate) path: String,
    pub(crate) value: Value,
}

pub(crate) fn run_progress(args: ProgressArgs) -> Result<(), AppError> {
    let ProgressArgs {
        values,
        errors,
        steps,
    } = args;

    let steps = match steps {
        Some(path) => load_steps(open(&path)?)?,
        None => provider_registration_steps(),
    };
    let values: FormValues = read_json(&values)?;
    let errors = match errors {
        Some(path) => read_json::<FormErrors>(&path)?,
        None => provider_registration_rules().validate(&values),
    };

    let breakdown = progress_breakdown(&steps, &values, &errors);
    print!("{}", render_breakdown(&breakdown, &errors));
    Ok(())
}

pub(crate) async fn run_autosave_replay(args: AutosaveArgs) -> Result<(), AppError> {
    let AutosaveArgs { events, user } = args;
    let config = AppConfig::load()?;
    let events: Vec<EditEvent> = read_json(&events)?;

    println!(
        "Replaying {} edit(s) with a {} ms debounce",
        events.len(),
        config.autosave.debounce.as_millis()
    );

    let outcome = replay(events, user.map(UserId::from), config.autosave).await;

    println!("\nNotifications");
    if outcome.notifications.is_empty() {
        println!("  (none)");
    }
    for notification in &outcome.notifications {
        match notification {
            Notification::DraftSaved { draft_id } => println!("  saved    {}", draft_id.0),
            Notification::DraftFailed { message } => println!("  failed   {message}"),
        }
    }

    match &outcome.latest {
        Some(draft) => println!(
            "\nLatest draft {} ({} top-level field(s), updated {})",
            draft.id.0,
            draft.payload.0.len(),
            draft.updated_date.to_rfc3339()
        ),
        None => println!("\nNo draft stored"),
    }

    match outcome.result {
        Ok(()) | Err(AutosaveError::MissingIdentity) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug)]
pub(crate) struct ReplayOutcome {
    pub(crate) notifications: Vec<Notification>,
    pub(crate) latest: Option<Draft>,
    pub(crate) result: Result<(), AutosaveError>,
}

/// Drives the controller the way the registration page does: each edit updates the form
/// and hands the full payload to `save_draft`. Anything still pending at the end is flushed.
pub(crate) async fn replay(
    mut events: Vec<EditEvent>,
    user: Option<UserId>,
    settings: AutosaveSettings,
) -> ReplayOutcome {
    events.sort_by_key(|event| event.at_ms);

    let store = Arc::new(InMemoryDraftStore::default());
    let notifier = Arc::new(CollectingNotifier::default());
    let controller = DraftSyncController::new(
        store,
        Arc::new(StaticIdentity(user)),
        notifier.clone(),
        DraftCache::new(),
        settings,
    );

    let mut form = FormState::with_rules(FormValues::new(), provider_registration_rules());
    let started = Instant::now();
    let mut result = Ok(());

    for event in events {
        tokio::time::sleep_until(started + Duration::from_millis(event.at_ms)).await;
        form.set_value(&event.path, event.value);
        if let Err(err) = controller.save_draft(form.values().clone()) {
            result = Err(err);
        }
    }

    if result.is_ok() {
        result = controller.flush().await.map(|_| ());
    }

    ReplayOutcome {
        notifications: notifier.events(),
        latest: controller.cache().latest(),
        result,
    }
}

pub(crate) fn render_breakdown(breakdown: &ProgressBreakdown, errors: &FormErrors) -> String {
    let mut out = format!(
        "Registration progress: {}% ({}/{} fields)\n",
        breakdown.percent, breakdown.completed, breakdown.total
    );

    for (index, step) in breakdown.steps.iter().enumerate() {
        let marker = if step.is_complete() { "x" } else { " " };
        out.push_str(&format!(
            "[{marker}] {}. {} - {}% ({}/{})\n",
            index + 1,
            step.title,
            step.percent,
            step.completed,
            step.total
        ));
        for subsection in &step.subsections {
            let state = if subsection.result.is_valid {
                "valid"
            } else if subsection.result.is_started {
                "in progress"
            } else {
                "not started"
            };
            out.push_str(&format!(
                "      {} - {}/{} ({state})\n",
                subsection.label, subsection.completed, subsection.total
            ));
        }
    }

    if let Some(step) = breakdown.first_incomplete_step() {
        out.push_str(&format!(
            "Next step to finish: {}\n",
            breakdown.steps[step].title
        ));
    }

    if !errors.is_empty() {
        out.push_str("Field errors:\n");
        for (path, message) in &errors.0 {
            out.push_str(&format!("  {path}: {message}\n"));
        }
    }

    out
}

fn open(path: &Path) -> Result<BufReader<File>, AppError> {
    Ok(BufReader::new(File::open(path)?))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let reader = open(path)?;
    serde_json::from_reader(reader).map_err(|err| AppError::from(FormLoadError::from(err)))
}
