use serde::Serialize;

use super::values::{is_truthy, split_path, FormErrors, FormValues};

/// Derived state of one subsection; recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubsectionResult {
    pub is_valid: bool,
    pub invalid_count: usize,
    pub is_started: bool,
}

/// Evaluate a list of field paths against the current values and errors.
///
/// Every field is checked by its literal path: a falsy value or an error at that path is
/// one invalid mark. Dotted paths are additionally checked through the nested
/// `values[parent][child]` lookup, and a falsy nested value is a second, independent
/// mark. A filled dotted field therefore still counts once when its literal key is
/// absent, and an empty one counts twice.
pub fn evaluate<S: AsRef<str>>(
    fields: &[S],
    values: &FormValues,
    errors: &FormErrors,
) -> SubsectionResult {
    let mut invalid_count = 0;
    let mut is_started = false;

    for field in fields {
        let path = field.as_ref();
        let flat_filled = is_truthy(values.flat(path));
        let nested_filled = split_path(path)
            .map(|(parent, child)| is_truthy(values.nested(parent, child)));

        if flat_filled || nested_filled == Some(true) {
            is_started = true;
        }

        if !flat_filled || errors.has(path) {
            invalid_count += 1;
        }
        if nested_filled == Some(false) {
            invalid_count += 1;
        }
    }

    SubsectionResult {
        is_valid: invalid_count == 0,
        invalid_count,
        is_started,
    }
}
