//! Condition helpers: replace-by-type with transition-time preservation, and
//! constructors for the three condition types the reconciler writes.

use crds::{CONDITION_ERROR, CONDITION_INITIALIZED, CONDITION_RUNNING, Condition, ConditionStatus};

/// Insert or replace the condition of the same type.
///
/// The transition time is kept when the status did not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time;
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Remove the condition of the given type. Returns whether one was removed.
pub fn remove_condition(conditions: &mut Vec<Condition>, type_: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.type_ != type_);
    conditions.len() != before
}

/// `Initialized=True` after a successful create or update.
pub fn initialized_condition(reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(CONDITION_INITIALIZED, ConditionStatus::True, reason, message)
}

/// `Running` with the given status.
pub fn running_condition(status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(CONDITION_RUNNING, status, reason, message)
}

/// `Error=True` carrying the last observed obstruction.
pub fn error_condition(reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(CONDITION_ERROR, ConditionStatus::True, reason, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut conditions = vec![error_condition("A", "first")];
        set_condition(&mut conditions, error_condition("B", "second"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, "B");
        assert_eq!(conditions[0].message, "second");
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let then = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut old = running_condition(ConditionStatus::True, "CheckRunning", "");
        old.last_transition_time = then;
        let mut conditions = vec![old];

        set_condition(&mut conditions, running_condition(ConditionStatus::True, "CheckRunning", "still"));
        assert_eq!(conditions[0].last_transition_time, then);

        set_condition(&mut conditions, running_condition(ConditionStatus::False, "CheckRunning", "down"));
        assert_ne!(conditions[0].last_transition_time, then);
    }

    #[test]
    fn test_remove_condition() {
        let mut conditions = vec![
            initialized_condition("Created", ""),
            error_condition("UnableToCreate", "boom"),
        ];
        assert!(remove_condition(&mut conditions, CONDITION_ERROR));
        assert!(!remove_condition(&mut conditions, CONDITION_ERROR));
        assert_eq!(conditions.len(), 1);
    }
}
