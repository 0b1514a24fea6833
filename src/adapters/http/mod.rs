//! HTTP adapters - axum integration for consumers of the pipeline.

pub mod middleware;

pub use middleware::{
    admission_middleware, AdmissionState, AuthenticatedSubject, DeviceFingerprint,
    VisibilityMultiplier,
};
