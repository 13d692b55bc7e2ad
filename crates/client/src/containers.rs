//! Container lifecycle endpoints.

use clouddeploy_protocol::{
    ContainerAction, ContainerActionResponse, ContainerStatusResponse, EntityStatus,
};

use crate::error::ApiError;
use crate::http::ApiClient;

impl ApiClient {
    pub async fn container_status(&self, id: &str) -> Result<EntityStatus, ApiError> {
        let response: ContainerStatusResponse =
            self.get(&format!("/containers/{id}/status")).await?;
        Ok(response.status)
    }

    /// `POST /containers/:id/<action>`. Empty acknowledgements decode as the
    /// default response.
    pub async fn container_action(
        &self,
        id: &str,
        action: ContainerAction,
    ) -> Result<ContainerActionResponse, ApiError> {
        let response: Option<ContainerActionResponse> =
            self.post::<(), _>(&action.path(id), None).await?;
        Ok(response.unwrap_or_default())
    }

    pub async fn start_container(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.container_action(id, ContainerAction::Start).await
    }

    pub async fn stop_container(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.container_action(id, ContainerAction::Stop).await
    }

    pub async fn restart_container(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.container_action(id, ContainerAction::Restart).await
    }

    pub async fn rebuild_container(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.container_action(id, ContainerAction::Rebuild).await
    }

    pub async fn create_container(&self, id: &str) -> Result<ContainerActionResponse, ApiError> {
        self.container_action(id, ContainerAction::Create).await
    }
}
