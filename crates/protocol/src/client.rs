//! Client → Server request bodies

use serde::{Deserialize, Serialize};

use crate::types::{EntityStatus, Template};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub github_url: String,
    pub template: Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProjectStatusRequest {
    pub status: EntityStatus,
}

/// Lifecycle operations exposed under `/containers/:id/<action>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Rebuild,
    Create,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
            ContainerAction::Rebuild => "rebuild",
            ContainerAction::Create => "create",
        }
    }

    /// Endpoint path relative to the API base URL
    pub fn path(&self, container_id: &str) -> String {
        format!("/containers/{}/{}", container_id, self.as_str())
    }
}
