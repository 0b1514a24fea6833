use crate::domain::foundation::Timestamp;

/// Source of "now" for every time-dependent rule.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
