//! Pipelines and workflows

use serde::{Deserialize, Serialize};

use super::{kind, validate_name, ObjectMeta, ResourceReference};
use crate::error::{PipelineError, Result};

/// A named, ordered collection of workflows applied to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name and namespace
    pub metadata: ObjectMeta,
    /// Workflows, executed in order
    #[serde(default)]
    pub workflows: Vec<PipelineWorkflow>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(name, namespace),
            workflows: Vec::new(),
        }
    }

    /// Pipeline name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Validate the pipeline definition
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidResource`] if the pipeline has no
    /// workflows or a workflow references the wrong resource kinds.
    pub fn validate(&self) -> Result<()> {
        validate_name("pipeline", &self.metadata.name)?;
        if self.workflows.is_empty() {
            return Err(PipelineError::InvalidResource(format!(
                "pipeline {} has no workflows",
                self.name()
            ))
            .into());
        }
        for workflow in &self.workflows {
            workflow.validate().map_err(|e| {
                PipelineError::InvalidResource(format!("pipeline {}: {}", self.name(), e))
            })?;
        }
        Ok(())
    }
}

/// One filter chain + mutator + handler unit of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineWorkflow {
    /// Workflow name, used in logs and failure reports
    pub name: String,
    /// Filters, evaluated in order with short-circuit AND semantics
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<ResourceReference>,
    /// Mutator producing the handler payload; defaults to `json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutator: Option<ResourceReference>,
    /// Handler receiving the payload
    pub handler: ResourceReference,
}

impl PipelineWorkflow {
    /// Create a workflow with only a handler
    pub fn new(name: impl Into<String>, handler: ResourceReference) -> Self {
        Self {
            name: name.into(),
            filters: Vec::new(),
            mutator: None,
            handler,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("workflow name must not be empty".to_string());
        }
        if self.handler.name.is_empty() {
            return Err(format!("workflow {} has no handler", self.name));
        }
        if self.handler.is_pipeline() {
            return Err(format!(
                "workflow {} handler {} must not be a pipeline",
                self.name, self.handler
            ));
        }
        if let Some(filter) = self.filters.iter().find(|f| f.is_type(kind::PIPELINE)) {
            return Err(format!(
                "workflow {} filter {} must not be a pipeline",
                self.name, filter
            ));
        }
        Ok(())
    }
}
