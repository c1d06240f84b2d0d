//! ARM resource and template serialization

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Artifact, ArtifactContent, ArtifactGraph, ArtifactKind};

/// Deployment template schema
pub const ARM_SCHEMA: &str =
    "http://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#";

/// Template content version
pub const ARM_CONTENT_VERSION: &str = "1.0.0.0";

/// API version for Synapse workspace resources
pub const ARM_API_VERSION: &str = "2019-06-01-preview";

/// Resource provider path of Synapse workspaces
pub const SYNAPSE_WORKSPACES: &str = "Microsoft.Synapse/workspaces";

#[derive(Debug, Error, PartialEq)]
pub enum ArmError {
    #[error("Artifact {artifact} of kind {kind} cannot be deployed through ARM")]
    UnsupportedKind { artifact: String, kind: ArtifactKind },

    #[error("Artifact {0} has no JSON properties")]
    NotStructured(String),

    #[error("Workspace name must not be empty")]
    MissingWorkspaceName,
}

/// A single ARM resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmResource {
    pub name: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub properties: Value,

    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

/// A full deployment template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmTemplate {
    #[serde(rename = "$schema")]
    pub schema: String,

    #[serde(rename = "contentVersion")]
    pub content_version: String,

    pub resources: Vec<ArmResource>,
}

impl ArmTemplate {
    /// Creates an empty template
    pub fn new() -> Self {
        Self {
            schema: ARM_SCHEMA.to_string(),
            content_version: ARM_CONTENT_VERSION.to_string(),
            resources: Vec::new(),
        }
    }

    /// Returns a resource by its full `<workspace>/<artifact>` name
    pub fn resource(&self, name: &str) -> Option<&ArmResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Serializes the template as pretty-printed JSON
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for ArmTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts workspace artifacts into ARM resources
#[derive(Debug, Clone)]
pub struct ArmSerializer {
    workspace_name: String,
}

impl ArmSerializer {
    /// Creates a serializer targeting the named workspace
    pub fn new(workspace_name: impl Into<String>) -> Result<Self, ArmError> {
        let workspace_name = workspace_name.into();
        if workspace_name.trim().is_empty() {
            return Err(ArmError::MissingWorkspaceName);
        }
        Ok(Self { workspace_name })
    }

    /// Returns the prefix used for dependency paths
    pub fn dependency_prefix(&self) -> String {
        format!("{}/{}", SYNAPSE_WORKSPACES, self.workspace_name)
    }

    /// Converts one artifact into an ARM resource
    pub fn resource(&self, artifact: &Artifact) -> Result<ArmResource, ArmError> {
        let spec = artifact.kind.spec();
        let suffix = spec.arm_resource_type.ok_or_else(|| ArmError::UnsupportedKind {
            artifact: artifact.id.clone(),
            kind: artifact.kind,
        })?;

        let properties = match &artifact.content {
            ArtifactContent::Structured(value) => value.clone(),
            ArtifactContent::Text(_) => return Err(ArmError::NotStructured(artifact.id.clone())),
        };

        let depends_on = if spec.accepts_depends_on {
            let prefix = self.dependency_prefix();
            artifact
                .ordering_references()
                .map(|r| r.format_arm_path(&prefix))
                .collect()
        } else {
            Vec::new()
        };

        Ok(ArmResource {
            name: format!("{}/{}", self.workspace_name, artifact.id),
            resource_type: format!("{}/{}", SYNAPSE_WORKSPACES, suffix),
            api_version: ARM_API_VERSION.to_string(),
            properties,
            depends_on,
        })
    }

    /// Converts a validated graph into a template, dependencies first
    pub fn template(&self, graph: &ArtifactGraph) -> Result<ArmTemplate, ArmError> {
        let mut template = ArmTemplate::new();
        for artifact in graph.ordered() {
            template.resources.push(self.resource(artifact)?);
        }
        Ok(template)
    }
}
