//! Structural merge engine.
//!
//! Combines a new fragment into an existing fragment and returns a freshly
//! built result. The engine knows nothing about products, versions or the
//! store; it operates on generic nested documents.
//!
//! Rules, applied per key of the input mapping:
//!
//! | input      | existing   | result                                   |
//! |------------|------------|------------------------------------------|
//! | any        | (absent)   | input inserted as-is                     |
//! | mapping    | mapping    | recursive merge                          |
//! | sequence   | sequence   | existing items, then input items         |
//! | same kind  | same kind  | input replaces existing                  |
//! | other      | other      | [`Error::TypeConflict`]                  |
//!
//! Keys of the existing mapping that the input does not mention are kept.
//! Sequence merging is pure append: nothing is deduplicated or reordered.

use serde_yaml::{Mapping, Value};

use crate::document::{ValueKind, is_flat, render};
use crate::error::{Error, Result};

/// Merges `input` into `existing` and returns the merged document.
///
/// Neither argument is modified.
///
/// # Errors
///
/// Returns [`Error::NotMappings`] if either argument is not a mapping, and
/// [`Error::TypeConflict`] if a key holds values of different kinds that
/// cannot be combined (for example a sequence and a string).
pub fn merge(input: &Value, existing: &Value) -> Result<Value> {
    match (input, existing) {
        (Value::Mapping(input), Value::Mapping(existing)) => {
            merge_mappings(input, existing).map(Value::Mapping)
        }
        _ => Err(Error::NotMappings {
            input_kind: ValueKind::of(input),
            existing_kind: ValueKind::of(existing),
        }),
    }
}

/// Merges two mappings. See the module documentation for the rules.
///
/// # Errors
///
/// Returns [`Error::TypeConflict`] on a kind mismatch at any depth.
pub fn merge_mappings(input: &Mapping, existing: &Mapping) -> Result<Mapping> {
    let mut merged = existing.clone();

    // Leaf-level mapping: nothing to recurse into or append to.
    if is_flat(existing) {
        for (key, value) in input {
            if let Some(current) = merged.get(key) {
                ensure_same_kind(value, current)?;
            }
            merged.insert(key.clone(), value.clone());
        }
        return Ok(merged);
    }

    for (key, value) in input {
        merge_entry(key, value, &mut merged)?;
    }
    Ok(merged)
}

fn merge_entry(key: &Value, input_value: &Value, target: &mut Mapping) -> Result<()> {
    let Some(current) = target.get_mut(key) else {
        target.insert(key.clone(), input_value.clone());
        return Ok(());
    };

    match (input_value, current) {
        (Value::Mapping(incoming), Value::Mapping(existing)) => {
            let merged = merge_mappings(incoming, existing)?;
            *existing = merged;
        }
        (Value::Sequence(incoming), Value::Sequence(existing)) => {
            existing.extend(incoming.iter().cloned());
        }
        (incoming, existing) => {
            ensure_same_kind(incoming, existing)?;
            *existing = incoming.clone();
        }
    }
    Ok(())
}

fn ensure_same_kind(input: &Value, existing: &Value) -> Result<()> {
    let input_kind = ValueKind::of(input);
    let existing_kind = ValueKind::of(existing);
    if input_kind == existing_kind {
        Ok(())
    } else {
        Err(Error::TypeConflict {
            input: render(input),
            input_kind,
            existing: render(existing),
            existing_kind,
        })
    }
}

/// Outcome of a shallow overwrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Overwrite {
    /// The existing mapping with every input key replaced or added.
    pub result: Mapping,
    /// Whether any key's value differs from before.
    pub changed: bool,
}

/// Replaces top-level keys of `existing` with those of `input`.
///
/// Values are swapped wholesale without recursion or kind checks. `changed`
/// compares values, so re-applying the same input reports no change.
#[must_use]
pub fn shallow_overwrite(input: &Mapping, existing: &Mapping) -> Overwrite {
    let mut result = existing.clone();
    let mut changed = false;
    for (key, value) in input {
        if result.get(key) != Some(value) {
            changed = true;
        }
        result.insert(key.clone(), value.clone());
    }
    Overwrite { result, changed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).expect("valid yaml")
    }

    #[test]
    fn sequences_append_existing_first() {
        let merged = merge(&yaml("{k: [a]}"), &yaml("{k: [b]}")).expect("merge");
        assert_eq!(merged, yaml("{k: [b, a]}"));
    }

    #[test]
    fn sequences_are_not_deduplicated() {
        let merged = merge(&yaml("{k: [a], n: {}}"), &yaml("{k: [a], n: {}}")).expect("merge");
        assert_eq!(merged, yaml("{k: [a, a], n: {}}"));
    }

    #[test]
    fn scalar_replaced_by_same_kind() {
        let merged = merge(&yaml("{k: 5}"), &yaml("{k: 3}")).expect("merge");
        assert_eq!(merged, yaml("{k: 5}"));
    }

    #[test]
    fn scalar_kind_mismatch_fails_on_flat_mapping() {
        let err = merge(&yaml("{k: 5}"), &yaml("{k: x}")).expect_err("kind conflict");
        assert!(matches!(
            err,
            Error::TypeConflict {
                input_kind: ValueKind::Integer,
                existing_kind: ValueKind::String,
                ..
            }
        ));
    }

    #[test]
    fn mappings_recurse() {
        let merged = merge(&yaml("{a: {x: 1}}"), &yaml("{a: {y: 2}}")).expect("merge");
        assert_eq!(merged, yaml("{a: {x: 1, y: 2}}"));
    }

    #[test]
    fn container_mismatch_fails() {
        let err = merge(&yaml("{a: [1]}"), &yaml("{a: {x: 1}}")).expect_err("kind conflict");
        assert!(err.is_type_conflict());
    }

    #[test]
    fn non_mapping_arguments_rejected() {
        let err = merge(&yaml("bad_input_data"), &yaml("{}")).expect_err("not mappings");
        assert!(matches!(
            err,
            Error::NotMappings {
                input_kind: ValueKind::String,
                existing_kind: ValueKind::Mapping,
            }
        ));
    }

    #[test]
    fn empty_input_is_identity() {
        let existing = yaml("{a: {b: [1, 2]}, c: d}");
        assert_eq!(merge(&yaml("{}"), &existing).expect("merge"), existing);
    }

    #[test]
    fn shallow_overwrite_reports_value_changes() {
        let existing = yaml("{a: {x: 1}, b: 2}");
        let existing = existing.as_mapping().expect("mapping");

        let same = yaml("{a: {x: 1}}");
        let outcome = shallow_overwrite(same.as_mapping().expect("mapping"), existing);
        assert!(!outcome.changed);
        assert_eq!(&outcome.result, existing);

        let different = yaml("{a: {y: 2}}");
        let outcome = shallow_overwrite(different.as_mapping().expect("mapping"), existing);
        assert!(outcome.changed);
        assert_eq!(Value::Mapping(outcome.result), yaml("{a: {y: 2}, b: 2}"));
    }
}
