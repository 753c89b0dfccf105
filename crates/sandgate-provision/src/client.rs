//! GraphQL-over-HTTP provisioning client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{ProvisionError, ProvisionSpec, Provisioner};

const SERVICE_CREATE_MUTATION: &str = r"
mutation serviceCreate($input: ServiceCreateInput!) {
  serviceCreate(input: $input) {
    id
  }
}
";

const SERVICE_DELETE_MUTATION: &str = r"
mutation serviceDelete($id: String!) {
  serviceDelete(id: $id)
}
";

/// Settings for the GraphQL provisioning endpoint. Immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// Bearer token for the platform API.
    pub api_token: String,
    /// Project the sandbox services are created in.
    pub project_id: String,
    /// Environment within the project.
    pub environment_id: String,
}

/// Provisioner backed by the platform's GraphQL API.
pub struct GraphqlProvisioner {
    http: reqwest::Client,
    settings: ProvisionerSettings,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceCreateData {
    #[serde(rename = "serviceCreate")]
    service_create: Option<ServiceCreatePayload>,
}

#[derive(Debug, Deserialize)]
struct ServiceCreatePayload {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceDeleteData {
    #[serde(rename = "serviceDelete")]
    service_delete: bool,
}

impl GraphqlProvisioner {
    pub fn new(settings: ProvisionerSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Execute one GraphQL request and unwrap its data envelope.
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ProvisionError> {
        let response = self
            .http
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_token)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProvisionError::Api(format!(
                "status {}",
                response.status()
            )));
        }

        let payload: GraphqlResponse<T> = response.json().await?;

        if let Some(errors) = payload.errors {
            if !errors.is_empty() {
                let messages = errors
                    .into_iter()
                    .map(|e| e.message.unwrap_or_else(|| "unknown error".to_string()))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ProvisionError::Api(messages));
            }
        }

        payload
            .data
            .ok_or_else(|| ProvisionError::Api("missing response data".to_string()))
    }
}

#[async_trait]
impl Provisioner for GraphqlProvisioner {
    async fn create(&self, spec: &ProvisionSpec) -> Result<String, ProvisionError> {
        let mut input = serde_json::json!({
            "projectId": self.settings.project_id,
            "environmentId": self.settings.environment_id,
            "name": spec.name,
            "source": { "image": spec.image },
        });
        if !spec.env.is_empty() {
            input["variables"] = serde_json::json!(spec.env);
        }

        let data: ServiceCreateData = self
            .request(SERVICE_CREATE_MUTATION, serde_json::json!({ "input": input }))
            .await?;

        let id = data
            .service_create
            .and_then(|s| s.id)
            .ok_or_else(|| ProvisionError::Api("missing service id".to_string()))?;

        debug!(name = %spec.name, resource_id = %id, "sandbox resource created");
        Ok(id)
    }

    async fn destroy(&self, resource_id: &str) -> Result<(), ProvisionError> {
        let data: ServiceDeleteData = self
            .request(
                SERVICE_DELETE_MUTATION,
                serde_json::json!({ "id": resource_id }),
            )
            .await?;

        if !data.service_delete {
            return Err(ProvisionError::Api("service delete refused".to_string()));
        }

        debug!(%resource_id, "sandbox resource destroyed");
        Ok(())
    }
}
