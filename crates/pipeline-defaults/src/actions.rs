//! Per-container actions exposed to the UI layer.

use serde::{Deserialize, Serialize};

use crate::container::MultiBranchContainer;
use crate::extension::FactoryKind;

/// Permissions the UI layer checks on a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Configure,
}

/// Whoever is asking the UI layer for a container's actions.
pub trait Caller {
    fn has_permission(&self, permission: Permission) -> bool;
}

/// Auxiliary actions attached to a container page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAction {
    /// Pipeline syntax helper for writing registry scripts.
    PipelineSyntax,
}

impl ContainerAction {
    pub fn url_name(&self) -> &'static str {
        match self {
            ContainerAction::PipelineSyntax => "pipeline-syntax",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContainerAction::PipelineSyntax => "Pipeline Syntax",
        }
    }
}

/// Actions for `container` as seen by `caller`.
///
/// The pipeline syntax helper is offered only when the defaults factory kind is
/// active on the container and the caller may read it.
pub fn container_actions(
    container: &MultiBranchContainer,
    caller: &dyn Caller,
) -> Vec<ContainerAction> {
    if container.is_kind_active(&FactoryKind::defaults()) && caller.has_permission(Permission::Read)
    {
        vec![ContainerAction::PipelineSyntax]
    } else {
        Vec::new()
    }
}
