//! Core types shared across the protocol

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle status of a project's container
///
/// The backend reports raw Docker states (`running`, `exited`, `created`,
/// `removing`) mixed with its own (`deploying`, `inactive`, `error`).
/// Anything unrecognised becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Created,
    Deploying,
    Running,
    #[serde(alias = "exited")]
    Stopped,
    Inactive,
    Error,
    Removing,
    #[serde(other)]
    Unknown,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Created => "created",
            EntityStatus::Deploying => "deploying",
            EntityStatus::Running => "running",
            EntityStatus::Stopped => "stopped",
            EntityStatus::Inactive => "inactive",
            EntityStatus::Error => "error",
            EntityStatus::Removing => "removing",
            EntityStatus::Unknown => "unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, EntityStatus::Running)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(EntityStatus::Created),
            "deploying" => Ok(EntityStatus::Deploying),
            "running" => Ok(EntityStatus::Running),
            "stopped" | "exited" => Ok(EntityStatus::Stopped),
            "inactive" => Ok(EntityStatus::Inactive),
            "error" => Ok(EntityStatus::Error),
            "removing" => Ok(EntityStatus::Removing),
            "unknown" => Ok(EntityStatus::Unknown),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Project template offered at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Static,
    React,
    Flask,
    Nodejs,
}

impl Template {
    pub const ALL: [Template; 4] = [
        Template::Static,
        Template::React,
        Template::Flask,
        Template::Nodejs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Template::Static => "static",
            Template::React => "react",
            Template::Flask => "flask",
            Template::Nodejs => "nodejs",
        }
    }

    /// Starter repository offered for the template, if there is one
    pub fn starter_repo(&self) -> Option<&'static str> {
        match self {
            Template::Static => Some("https://github.com/clouddeploy-templates/html-static"),
            Template::React => Some("https://github.com/clouddeploy-templates/react-app"),
            Template::Flask => Some("https://github.com/clouddeploy-templates/flask-backend"),
            Template::Nodejs => None,
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown template '{s}' (expected static, react, flask or nodejs)"))
    }
}

/// Colour scheme preference persisted by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

/// Authenticated user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Live container metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetrics {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub requests: u64,
    #[serde(default = "default_uptime")]
    pub uptime: String,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default, rename = "memory_usage", skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl EntityMetrics {
    /// Metrics for a container that just came up
    pub fn zeroed(last_activity: String) -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            requests: 0,
            uptime: default_uptime(),
            last_activity: Some(last_activity),
            memory_usage: None,
            network: None,
        }
    }
}

fn default_uptime() -> String {
    "0s".to_string()
}

/// Metrics summary embedded in a project record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetrics {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub requests: u64,
}

/// A hosted project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(alias = "_id", deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub url: String,
    pub template: Template,
    #[serde(default)]
    pub github_url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metrics: ProjectMetrics,
}

impl Project {
    /// Public URL with a scheme, as served by the local proxy
    pub fn normalized_url(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Prefix `http://` to URLs stored without a scheme
pub fn normalize_url(url: &str) -> String {
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    format!("http://{url}")
}

/// Ids come back as strings or numbers depending on the backend store.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_exited_maps_to_stopped() {
        let status: EntityStatus = serde_json::from_str("\"exited\"").unwrap();
        assert_eq!(status, EntityStatus::Stopped);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"stopped\"");
    }

    #[test]
    fn unrecognised_status_is_unknown() {
        let status: EntityStatus = serde_json::from_str("\"restarting\"").unwrap();
        assert_eq!(status, EntityStatus::Unknown);
    }

    #[test]
    fn project_accepts_numeric_and_mongo_ids() {
        let numeric = r#"{"id":1731,"name":"demo","status":"deploying","template":"react"}"#;
        let project: Project = serde_json::from_str(numeric).unwrap();
        assert_eq!(project.id, "1731");
        assert_eq!(project.metrics, ProjectMetrics::default());

        let mongo = r#"{"_id":"abc","name":"demo","status":"running","template":"static",
            "url":"demo.bob.localhost","github_url":"https://github.com/x/y"}"#;
        let project: Project = serde_json::from_str(mongo).unwrap();
        assert_eq!(project.id, "abc");
        assert_eq!(project.normalized_url(), "http://demo.bob.localhost");
    }

    #[test]
    fn metrics_tolerate_backend_extras() {
        let json = r#"{"cpu":42,"memory":128,"memory_usage":"120MB / 512MB",
            "network":"3MB","requests":7,"uptime":"1h 2m","lastActivity":"2025-11-01T10:30:00Z"}"#;
        let metrics: EntityMetrics = serde_json::from_str(json).unwrap();
        assert_eq!(metrics.cpu, 42.0);
        assert_eq!(metrics.requests, 7);
        assert_eq!(metrics.memory_usage.as_deref(), Some("120MB / 512MB"));
        assert_eq!(metrics.last_activity.as_deref(), Some("2025-11-01T10:30:00Z"));
    }

    #[test]
    fn normalize_url_keeps_existing_scheme() {
        assert_eq!(normalize_url("https://example.com"), "https://example.com");
        assert_eq!(normalize_url("ccc.bryan.localhost"), "http://ccc.bryan.localhost");
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn template_parses_case_insensitively() {
        assert_eq!("React".parse::<Template>(), Ok(Template::React));
        assert!("rails".parse::<Template>().is_err());
    }
}
