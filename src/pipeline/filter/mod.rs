//! Filter adapters
//!
//! Built-in filters are matched by their well-known event filter name and
//! need no store access. Any other event filter reference is served by
//! [`LegacyFilterAdapter`], which fetches the stored definition and
//! evaluates its expressions.

pub mod expression;
pub mod has_metrics;
pub mod is_incident;
pub mod legacy;
pub mod not_silenced;

pub use expression::PathEvaluator;
pub use has_metrics::HasMetrics;
pub use is_incident::IsIncident;
pub use legacy::{FilterEvaluator, LegacyFilterAdapter};
pub use not_silenced::NotSilenced;

use crate::resources::{kind, ResourceReference};

/// Names of the built-in event filters
pub const BUILTIN_FILTERS: [&str; 3] = [
    has_metrics::FILTER_NAME,
    is_incident::FILTER_NAME,
    not_silenced::FILTER_NAME,
];

/// Returns true when the reference names a `core/v2` event filter called `name`
pub(crate) fn is_builtin(reference: &ResourceReference, name: &str) -> bool {
    reference.api_version == crate::resources::CORE_API_VERSION
        && reference.is_type(kind::EVENT_FILTER)
        && reference.name == name
}
