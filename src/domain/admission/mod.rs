//! Admission domain - request context in, one verdict out.

mod policy;
mod request;
mod verdict;

pub use policy::FailurePolicy;
pub use request::{anonymous_subject, RequestContext, ANONYMOUS_SUBJECT_PREFIX};
pub use verdict::{DenialReason, Verdict};
