//! Azure workspace identity.

use shared::models::ManagementIdentity;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while parsing a workspace resource id.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceIdError {
    /// The id was empty.
    #[error("empty resource id")]
    Empty,

    /// The id has fewer segments than a workspace id.
    #[error("invalid resource id: {0}")]
    TooShort(String),

    /// The subscription, resource group or workspace segment is missing.
    #[error("failed to parse resource id: {0}")]
    Incomplete(String),
}

/// A parsed `Microsoft.OperationalInsights/workspaces` resource id.
///
/// # Example
///
/// ```
/// use gather::azure::WorkspaceResourceId;
///
/// let id: WorkspaceResourceId = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.OperationalInsights/workspaces/ws"
///     .parse()
///     .unwrap();
/// assert_eq!(id.subscription_id, "sub");
/// assert_eq!(id.resource_group, "rg");
/// assert_eq!(id.workspace_name, "ws");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceResourceId {
    /// Subscription id.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Workspace name.
    pub workspace_name: String,
}

impl WorkspaceResourceId {
    /// Returns the canonical ARM path of the workspace.
    #[must_use]
    pub fn resource_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.OperationalInsights/workspaces/{}",
            self.subscription_id, self.resource_group, self.workspace_name
        )
    }

    /// Returns the identity triple written as `metadata/azure.json`.
    #[must_use]
    pub fn identity(&self) -> ManagementIdentity {
        ManagementIdentity {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            workspace_name: self.workspace_name.clone(),
        }
    }
}

impl FromStr for WorkspaceResourceId {
    type Err = ResourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        if id.is_empty() {
            return Err(ResourceIdError::Empty);
        }
        let parts: Vec<&str> = id.split('/').collect();
        if parts.len() < 9 {
            return Err(ResourceIdError::TooShort(id.to_string()));
        }

        let (mut subscription, mut group, mut workspace) = ("", "", "");
        for pair in parts.windows(2) {
            match pair[0].to_ascii_lowercase().as_str() {
                "subscriptions" => subscription = pair[1],
                "resourcegroups" => group = pair[1],
                "workspaces" => workspace = pair[1],
                _ => {}
            }
        }

        if subscription.is_empty() || group.is_empty() || workspace.is_empty() {
            return Err(ResourceIdError::Incomplete(id.to_string()));
        }
        Ok(Self {
            subscription_id: subscription.to_string(),
            resource_group: group.to_string(),
            workspace_name: workspace.to_string(),
        })
    }
}

impl std::fmt::Display for WorkspaceResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.resource_path())
    }
}
