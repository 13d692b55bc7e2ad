//! Project endpoints.

use clouddeploy_protocol::{
    CreateProjectRequest, EntityStatus, Project, ProjectResponse, ProjectsResponse, Template,
    UpdateProjectStatusRequest,
};

use crate::error::ApiError;
use crate::http::ApiClient;

const GITHUB_PREFIX: &str = "https://github.com/";

pub fn validate_new_project(name: &str, github_url: &str) -> Result<(), ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid_input("Project name is required"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::invalid_input(
            "Project name may only contain letters, numbers, '-' and '_'",
        ));
    }
    let repo = github_url.trim().strip_prefix(GITHUB_PREFIX).unwrap_or("");
    if repo.trim_matches('/').is_empty() {
        return Err(ApiError::invalid_input(
            "GitHub URL must look like https://github.com/<owner>/<repo>",
        ));
    }
    Ok(())
}

fn project_path(id: &str) -> String {
    format!("/projects/{id}")
}

impl ApiClient {
    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let response: ProjectsResponse = self.get("/projects").await?;
        Ok(response.projects)
    }

    pub async fn create_project(
        &self,
        name: &str,
        github_url: &str,
        template: Template,
    ) -> Result<Project, ApiError> {
        validate_new_project(name, github_url)?;
        let body = CreateProjectRequest {
            name: name.trim().to_string(),
            github_url: github_url.trim().to_string(),
            template,
        };
        let response: ProjectResponse = self.post("/projects", Some(&body)).await?;
        Ok(response.project)
    }

    /// `None` when the project does not exist (404)
    pub async fn get_project(&self, id: &str) -> Result<Option<Project>, ApiError> {
        match self.get::<ProjectResponse>(&project_path(id)).await {
            Ok(response) => Ok(Some(response.project)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self.delete(&project_path(id)).await?;
        Ok(())
    }

    pub async fn update_project_status(
        &self,
        id: &str,
        status: EntityStatus,
    ) -> Result<Project, ApiError> {
        let body = UpdateProjectStatusRequest { status };
        let response: ProjectResponse = self
            .patch(&format!("{}/status", project_path(id)), &body)
            .await?;
        Ok(response.project)
    }
}
