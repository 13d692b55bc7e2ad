//! User-initiated operations.
//!
//! Each action calls the API and keeps the projection in step: lifecycle
//! actions write an optimistic `Deploying` first and revert it if the call
//! fails. Errors come back typed for the UI to show.

use std::sync::Arc;

use clouddeploy_protocol::{
    ContainerAction, ContainerActionResponse, EntityStatus, Project, Template,
};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::http::ApiClient;
use crate::projection::Projection;
use crate::signals::{ProjectSignal, Signals};

#[derive(Clone)]
pub struct Actions {
    api: ApiClient,
    projection: Arc<Projection>,
    project_signals: Arc<Signals<ProjectSignal>>,
}

impl Actions {
    pub fn new(
        api: ApiClient,
        projection: Arc<Projection>,
        project_signals: Arc<Signals<ProjectSignal>>,
    ) -> Self {
        Self {
            api,
            projection,
            project_signals,
        }
    }

    /// List projects and seed the projection with their statuses
    pub async fn load_projects(&self) -> Result<Vec<Project>, ApiError> {
        let projects = self.api.list_projects().await?;
        for project in &projects {
            self.projection.apply_status(&project.id, project.status);
        }
        Ok(projects)
    }

    pub async fn create_project(
        &self,
        name: &str,
        github_url: &str,
        template: Template,
    ) -> Result<Project, ApiError> {
        let project = self.api.create_project(name, github_url, template).await?;
        self.projection.apply_status(&project.id, project.status);
        info!(
            component = "actions",
            event = "actions.project_created",
            project_id = %project.id,
            status = %project.status,
            "Project created"
        );
        self.project_signals
            .emit(&ProjectSignal::Created(project.id.clone()));
        Ok(project)
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_project(id).await?;
        self.projection.remove(id);
        info!(
            component = "actions",
            event = "actions.project_deleted",
            project_id = id,
            "Project deleted"
        );
        self.project_signals
            .emit(&ProjectSignal::Deleted(id.to_string()));
        Ok(())
    }

    pub async fn set_status(&self, id: &str, status: EntityStatus) -> Result<Project, ApiError> {
        let project = self.api.update_project_status(id, status).await?;
        self.projection.apply_status(&project.id, project.status);
        Ok(project)
    }

    /// Ask the server for the current status and record it
    pub async fn refresh_status(&self, id: &str) -> Result<EntityStatus, ApiError> {
        let status = self.api.container_status(id).await?;
        self.projection.apply_status(id, status);
        Ok(status)
    }

    pub async fn start(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.optimistic_action(id, ContainerAction::Start).await
    }

    pub async fn restart(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.optimistic_action(id, ContainerAction::Restart).await
    }

    pub async fn rebuild(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.optimistic_action(id, ContainerAction::Rebuild).await
    }

    pub async fn create_container(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.optimistic_action(id, ContainerAction::Create).await
    }

    /// No optimistic write: the container is only `Stopped` once the
    /// server says so.
    pub async fn stop(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        let response = self.api.stop_container(id).await?;
        self.projection.apply_status(id, EntityStatus::Stopped);
        Ok(response)
    }

    async fn optimistic_action(
        &self,
        id: &str,
        action: ContainerAction,
    ) -> Result<ContainerActionResponse, ApiError> {
        let pending = self.projection.apply_optimistic(id, EntityStatus::Deploying);

        match self.api.container_action(id, action).await {
            Ok(response) => {
                if let Some(status) = response.status.filter(|s| *s != EntityStatus::Unknown) {
                    self.projection.apply_status(id, status);
                }
                Ok(response)
            }
            Err(e) => {
                let reverted = self.projection.revert(pending);
                warn!(
                    component = "actions",
                    event = "actions.container_action_failed",
                    project_id = id,
                    action = action.as_str(),
                    reverted,
                    error = %e,
                    "Container action failed"
                );
                Err(e)
            }
        }
    }
}
