//! # ARM Template Generation
//!
//! Projects a validated [`ArtifactGraph`](crate::domain::ArtifactGraph) of
//! Synapse workspace artifacts onto an ARM deployment template.
//!
//! ## Output Shape
//!
//! ```text
//! {
//!   "$schema": "...deploymentTemplate.json#",
//!   "contentVersion": "1.0.0.0",
//!   "resources": [
//!     {
//!       "name": "<workspace>/<artifact>",
//!       "type": "Microsoft.Synapse/workspaces/<kind>s",
//!       "apiVersion": "2019-06-01-preview",
//!       "properties": { ... },
//!       "dependsOn": ["Microsoft.Synapse/workspaces/<workspace>/<kind>s/<name>"]
//!     }
//!   ]
//! }
//! ```
//!
//! Resources are listed dependencies first. Ignored references never appear
//! in `dependsOn`, and notebooks always carry an empty list.

mod template;

pub use template::{
    ArmError, ArmResource, ArmSerializer, ArmTemplate, ARM_API_VERSION, ARM_CONTENT_VERSION,
    ARM_SCHEMA, SYNAPSE_WORKSPACES,
};
