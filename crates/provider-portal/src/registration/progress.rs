use serde::Serialize;

use super::form::FormStep;
use super::validity::{evaluate, SubsectionResult};
use super::values::{FormErrors, FormValues};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FieldTally {
    completed: usize,
    total: usize,
}

impl FieldTally {
    fn add(&mut self, other: FieldTally) {
        self.completed += other.completed;
        self.total += other.total;
    }

    fn percent(&self) -> u8 {
        percent(self.completed, self.total)
    }
}

/// Fields a subsection contributes to the overall tally. Dotted fields can be marked
/// invalid twice, so the completed count saturates at zero.
fn tally(field_count: usize, result: &SubsectionResult) -> FieldTally {
    let completed = if result.is_valid {
        field_count
    } else {
        field_count.saturating_sub(result.invalid_count)
    };
    FieldTally {
        completed,
        total: field_count,
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = (completed as f64 / total as f64) * 100.0;
    ratio.round().clamp(0.0, 100.0) as u8
}

/// Overall completion percentage of the form.
///
/// Fields listed in more than one subsection are counted once per listing.
pub fn compute_progress(steps: &[FormStep], values: &FormValues, errors: &FormErrors) -> u8 {
    let mut overall = FieldTally::default();
    for step in steps {
        for subsection in &step.subsections {
            let result = evaluate(&subsection.fields, values, errors);
            overall.add(tally(subsection.fields.len(), &result));
        }
    }
    overall.percent()
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsectionProgress {
    pub label: String,
    pub completed: usize,
    pub total: usize,
    #[serde(flatten)]
    pub result: SubsectionResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepProgress {
    pub title: String,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub subsections: Vec<SubsectionProgress>,
}

impl StepProgress {
    /// A step is complete once every subsection evaluates valid.
    pub fn is_complete(&self) -> bool {
        self.subsections.iter().all(|entry| entry.result.is_valid)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressBreakdown {
    pub percent: u8,
    pub completed: usize,
    pub total: usize,
    pub steps: Vec<StepProgress>,
}

impl ProgressBreakdown {
    /// First step that still has invalid subsections, for "resume where you left off".
    pub fn first_incomplete_step(&self) -> Option<usize> {
        self.steps.iter().position(|step| !step.is_complete())
    }
}

/// Same computation as [`compute_progress`], retaining the per-step and per-subsection
/// tallies.
pub fn progress_breakdown(
    steps: &[FormStep],
    values: &FormValues,
    errors: &FormErrors,
) -> ProgressBreakdown {
    let mut overall = FieldTally::default();
    let mut step_entries = Vec::with_capacity(steps.len());

    for step in steps {
        let mut step_tally = FieldTally::default();
        let subsections = step
            .subsections
            .iter()
            .map(|subsection| {
                let result = evaluate(&subsection.fields, values, errors);
                let counts = tally(subsection.fields.len(), &result);
                step_tally.add(counts);
                SubsectionProgress {
                    label: subsection.label.clone(),
                    completed: counts.completed,
                    total: counts.total,
                    result,
                }
            })
            .collect();

        overall.add(step_tally);
        step_entries.push(StepProgress {
            title: step.title.clone(),
            completed: step_tally.completed,
            total: step_tally.total,
            percent: step_tally.percent(),
            subsections,
        });
    }

    ProgressBreakdown {
        percent: overall.percent(),
        completed: overall.completed,
        total: overall.total,
        steps: step_entries,
    }
}
