//! Edge cache maintenance after a static asset deployment.

mod invalidation;

pub use invalidation::{
    CacheInvalidator, DEFAULT_INVALIDATION_PATHS, InvalidationReport, InvalidationSettings,
    caller_reference,
};
