//! `validate` command: check a resource file before loading it

use std::collections::HashSet;
use std::path::Path;

use colored::Colorize;

use crate::error::{PipelineError, Result};
use crate::pipeline::filter::BUILTIN_FILTERS;
use crate::pipeline::mutator::BUILTIN_MUTATORS;
use crate::resources::{kind, Resource, ResourceReference, CORE_API_VERSION};
use crate::store::memory::parse_resources;

/// Findings for a resource file
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Number of resources parsed
    pub resources: usize,
    /// Resources that fail their own validation
    pub errors: Vec<String>,
    /// References to resources the file does not define
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Returns true when no resource failed validation
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate every resource, then check the references between them
///
/// Dangling references are warnings only: the referenced resource may be
/// provided by another file.
pub fn validate_resources(resources: &[Resource]) -> ValidationReport {
    let mut report = ValidationReport {
        resources: resources.len(),
        ..ValidationReport::default()
    };

    let mut defined: HashSet<(&'static str, String)> = HashSet::new();
    for resource in resources {
        if let Err(e) = resource.validate() {
            report
                .errors
                .push(format!("{} {}: {}", resource.kind(), resource.name(), e));
        }
        defined.insert((resource.kind(), resource.name()));
    }

    let is_defined = |kind: &'static str, name: &str| defined.contains(&(kind, name.to_string()));
    let mut check = |owner: String, reference: &ResourceReference| {
        if reference.api_version != CORE_API_VERSION {
            return;
        }
        let builtin = (reference.is_type(kind::EVENT_FILTER)
            && BUILTIN_FILTERS.contains(&reference.name.as_str()))
            || (reference.is_type(kind::MUTATOR)
                && BUILTIN_MUTATORS.contains(&reference.name.as_str()));
        let known = [kind::HANDLER, kind::MUTATOR, kind::EVENT_FILTER]
            .into_iter()
            .find(|k| reference.is_type(k));
        if let Some(resource_kind) = known {
            if !builtin && !is_defined(resource_kind, &reference.name) {
                report
                    .warnings
                    .push(format!("{} references undefined {}", owner, reference));
            }
        }
    };

    for resource in resources {
        match resource {
            Resource::Pipeline(pipeline) => {
                for workflow in &pipeline.workflows {
                    let owner = format!("pipeline {} workflow {}", pipeline.name(), workflow.name);
                    for filter in &workflow.filters {
                        check(owner.clone(), filter);
                    }
                    if let Some(mutator) = &workflow.mutator {
                        check(owner.clone(), mutator);
                    }
                    check(owner, &workflow.handler);
                }
            }
            Resource::Handler(handler) => {
                let owner = format!("handler {}", handler.name());
                for member in &handler.handlers {
                    check(owner.clone(), &ResourceReference::handler(member.as_str()));
                }
                for filter in &handler.filters {
                    check(owner.clone(), &ResourceReference::event_filter(filter.as_str()));
                }
                if let Some(mutator) = &handler.mutator {
                    check(owner, &ResourceReference::mutator(mutator.as_str()));
                }
            }
            _ => {}
        }
    }

    report
}

/// Parse and validate a resource file, printing the findings
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or any resource is
/// invalid.
pub fn run_validate(resources: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(resources).map_err(PipelineError::Io)?;
    let parsed = parse_resources(&contents)?;
    let report = validate_resources(&parsed);

    for warning in &report.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    for error in &report.errors {
        println!("{} {}", "error:".red().bold(), error);
    }

    if !report.is_valid() {
        return Err(PipelineError::InvalidResource(format!(
            "{} of {} resources in {} are invalid",
            report.errors.len(),
            report.resources,
            resources.display()
        ))
        .into());
    }

    println!(
        "{}",
        format!(
            "{} resources in {} are valid",
            report.resources,
            resources.display()
        )
        .green()
    );
    Ok(())
}
