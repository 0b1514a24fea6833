//! HTTP middleware for axum.
//!
//! - `admission` - Runs the admission pipeline in front of a route

pub mod admission;

pub use admission::{
    admission_middleware, AdmissionState, AuthenticatedSubject, DeviceFingerprint,
    VisibilityMultiplier,
};
