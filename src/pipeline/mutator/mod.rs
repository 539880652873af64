//! Mutator adapters
//!
//! A workflow without a mutator uses the `json` mutator, which hands the
//! handler the event's JSON encoding unchanged.

pub mod json;
pub mod legacy;
pub mod only_check_output;

pub use json::JsonMutator;
pub use legacy::LegacyMutatorAdapter;
pub use only_check_output::OnlyCheckOutput;

use crate::resources::{kind, ResourceReference, CORE_API_VERSION};

/// Names of the built-in mutators
pub const BUILTIN_MUTATORS: [&str; 2] = [json::MUTATOR_NAME, only_check_output::MUTATOR_NAME];

/// Reference used when a workflow names no mutator
pub fn default_mutator() -> ResourceReference {
    ResourceReference::mutator(json::MUTATOR_NAME)
}

pub(crate) fn is_builtin(reference: &ResourceReference, name: &str) -> bool {
    reference.api_version == CORE_API_VERSION
        && reference.is_type(kind::MUTATOR)
        && reference.name == name
}
