//! # HTTP Adapter
//!
//! `reqwest` implementation of the Keycloak admin REST API.

use super::types::{FlowExecution, RealmRef, TokenResponse};
use super::{
    AccessToken, AdapterFactory, AuthFlow, AuthenticationExecution, ClientScope, Component,
    Credentials, Group, KeycloakApi, KeycloakError,
};
use crate::constants::{ADMIN_CLI_CLIENT, ADMIN_REALM};
use crate::crd::AdminType;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::LOCATION, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builds authenticated `HttpKeycloakClient`s sharing one connection pool
#[derive(Debug, Clone)]
pub struct HttpAdapterFactory {
    http: reqwest::Client,
}

impl HttpAdapterFactory {
    /// Create a factory whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, KeycloakError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl AdapterFactory for HttpAdapterFactory {
    async fn authenticate(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<AccessToken, KeycloakError> {
        let url = format!(
            "{}/realms/{ADMIN_REALM}/protocol/openid-connect/token",
            base_url.trim_end_matches('/')
        );

        let form: Vec<(&str, &str)> = match credentials.admin_type() {
            AdminType::User => vec![
                ("grant_type", "password"),
                ("client_id", ADMIN_CLI_CLIENT),
                ("username", credentials.username()),
                ("password", credentials.password()),
            ],
            AdminType::ServiceAccount => vec![
                ("grant_type", "client_credentials"),
                ("client_id", credentials.username()),
                ("client_secret", credentials.password()),
            ],
        };

        debug!(url = %url, admin_type = ?credentials.admin_type(), "Requesting admin token");
        let response = check(self.http.post(&url).form(&form).send().await?, "token endpoint").await?;
        let body: TokenResponse = decode(response).await?;

        Ok(AccessToken::new(
            body.access_token,
            Utc::now() + chrono::Duration::seconds(body.expires_in),
        ))
    }

    fn build(&self, base_url: &str, token: AccessToken) -> Arc<dyn KeycloakApi> {
        Arc::new(HttpKeycloakClient {
            http: self.http.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

/// Admin API client bound to one server and one access token
#[derive(Debug)]
pub struct HttpKeycloakClient {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl HttpKeycloakClient {
    fn url(&self, realm: &str, path: &str) -> String {
        if path.is_empty() {
            format!("{}/admin/realms/{realm}", self.base_url)
        } else {
            format!("{}/admin/realms/{realm}/{path}", self.base_url)
        }
    }

    fn request(&self, method: Method, realm: &str, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(realm, path))
            .bearer_auth(self.token.secret())
    }

    async fn find_group(&self, realm: &str, name: &str) -> Result<Group, KeycloakError> {
        let response = self
            .request(Method::GET, realm, "groups")
            .query(&[("search", name)])
            .send()
            .await?;
        let groups: Vec<Group> = decode(check(response, "groups").await?).await?;

        groups
            .into_iter()
            .find(|group| group.name == name)
            .ok_or_else(|| KeycloakError::not_found(format!("group {name}")))
    }

    async fn find_auth_flow(&self, realm: &str, alias: &str) -> Result<AuthFlow, KeycloakError> {
        let response = self
            .request(Method::GET, realm, "authentication/flows")
            .send()
            .await?;
        let flows: Vec<AuthFlow> = decode(check(response, "authentication flows").await?).await?;

        flows
            .into_iter()
            .find(|flow| flow.alias == alias)
            .ok_or_else(|| KeycloakError::not_found(format!("auth flow {alias}")))
    }

    async fn flow_executions(
        &self,
        realm: &str,
        alias: &str,
    ) -> Result<Vec<FlowExecution>, KeycloakError> {
        let response = self
            .request(Method::GET, realm, &format!("authentication/flows/{alias}/executions"))
            .send()
            .await?;
        decode(check(response, "flow executions").await?).await
    }

    async fn add_execution(
        &self,
        realm: &str,
        alias: &str,
        execution: &AuthenticationExecution,
    ) -> Result<(), KeycloakError> {
        let response = if execution.authenticator_flow {
            self.request(
                Method::POST,
                realm,
                &format!("authentication/flows/{alias}/executions/flow"),
            )
            .json(&json!({
                "alias": execution.authenticator,
                "type": "basic-flow",
                "description": "",
            }))
            .send()
            .await?
        } else {
            self.request(
                Method::POST,
                realm,
                &format!("authentication/flows/{alias}/executions/execution"),
            )
            .json(&json!({ "provider": execution.authenticator }))
            .send()
            .await?
        };
        check(response, "flow executions").await?;

        // New executions are appended at the end of the top level
        let created = self
            .flow_executions(realm, alias)
            .await?
            .into_iter()
            .rev()
            .find(|e| e.level == 0)
            .ok_or_else(|| KeycloakError::Decode(format!("execution missing in flow {alias}")))?;

        let response = self
            .request(
                Method::PUT,
                realm,
                &format!("authentication/flows/{alias}/executions"),
            )
            .json(&json!({ "id": created.id, "requirement": execution.requirement }))
            .send()
            .await?;
        check(response, "flow executions").await?;

        if let Some(config) = &execution.authenticator_config {
            let response = self
                .request(
                    Method::POST,
                    realm,
                    &format!("authentication/executions/{}/config", created.id),
                )
                .json(config)
                .send()
                .await?;
            check(response, "execution config").await?;
        }

        Ok(())
    }

    async fn set_default_scope(
        &self,
        realm: &str,
        id: &str,
        default: bool,
    ) -> Result<(), KeycloakError> {
        let path = format!("default-default-client-scopes/{id}");
        if default {
            let response = self.request(Method::PUT, realm, &path).send().await?;
            check(response, "default client scope").await?;
        } else {
            let response = self.request(Method::DELETE, realm, &path).send().await?;
            if let Err(e) = check(response, "default client scope").await {
                if !e.is_not_found() {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn replace_protocol_mappers(
        &self,
        realm: &str,
        id: &str,
        scope: &ClientScope,
    ) -> Result<(), KeycloakError> {
        let path = format!("client-scopes/{id}/protocol-mappers/models");
        let response = self.request(Method::GET, realm, &path).send().await?;
        let current: Vec<serde_json::Value> =
            decode(check(response, "protocol mappers").await?).await?;

        for mapper in current {
            if let Some(mapper_id) = mapper.get("id").and_then(|v| v.as_str()) {
                let response = self
                    .request(Method::DELETE, realm, &format!("{path}/{mapper_id}"))
                    .send()
                    .await?;
                check(response, "protocol mapper").await?;
            }
        }

        for mapper in &scope.protocol_mappers {
            let response = self
                .request(Method::POST, realm, &path)
                .json(mapper)
                .send()
                .await?;
            check(response, "protocol mapper").await?;
        }

        Ok(())
    }
}

#[async_trait]
impl KeycloakApi for HttpKeycloakClient {
    async fn get_client_scope(&self, realm: &str, name: &str) -> Result<ClientScope, KeycloakError> {
        let response = self
            .request(Method::GET, realm, "client-scopes")
            .send()
            .await?;
        let scopes: Vec<ClientScope> = decode(check(response, "client scopes").await?).await?;

        scopes
            .into_iter()
            .find(|scope| scope.name == name)
            .ok_or_else(|| KeycloakError::not_found(format!("client scope {name}")))
    }

    async fn create_client_scope(
        &self,
        realm: &str,
        scope: &ClientScope,
    ) -> Result<String, KeycloakError> {
        let response = self
            .request(Method::POST, realm, "client-scopes")
            .json(scope)
            .send()
            .await?;
        let id = created_id(&check(response, "client scopes").await?)?;

        if scope.default {
            self.set_default_scope(realm, &id, true).await?;
        }

        Ok(id)
    }

    async fn update_client_scope(
        &self,
        realm: &str,
        id: &str,
        scope: &ClientScope,
    ) -> Result<(), KeycloakError> {
        let mut body = scope.clone();
        body.id = Some(id.to_string());

        let response = self
            .request(Method::PUT, realm, &format!("client-scopes/{id}"))
            .json(&body)
            .send()
            .await?;
        check(response, "client scope").await?;

        self.replace_protocol_mappers(realm, id, scope).await?;
        self.set_default_scope(realm, id, scope.default).await
    }

    async fn delete_client_scope(&self, realm: &str, id: &str) -> Result<(), KeycloakError> {
        let response = self
            .request(Method::DELETE, realm, &format!("client-scopes/{id}"))
            .send()
            .await?;
        check(response, &format!("client scope {id}")).await?;
        Ok(())
    }

    async fn sync_realm_group(&self, realm: &str, group: &Group) -> Result<String, KeycloakError> {
        let id = match self.find_group(realm, &group.name).await {
            Ok(existing) => {
                let id = existing
                    .id
                    .ok_or_else(|| KeycloakError::Decode(format!("group {} has no id", group.name)))?;
                let mut body = group.clone();
                body.id = Some(id.clone());

                let response = self
                    .request(Method::PUT, realm, &format!("groups/{id}"))
                    .json(&body)
                    .send()
                    .await?;
                check(response, "group").await?;
                id
            }
            Err(e) if e.is_not_found() => {
                let response = self
                    .request(Method::POST, realm, "groups")
                    .json(group)
                    .send()
                    .await?;
                created_id(&check(response, "groups").await?)?
            }
            Err(e) => return Err(e),
        };

        if !group.realm_roles.is_empty() {
            let mut roles = Vec::with_capacity(group.realm_roles.len());
            for role in &group.realm_roles {
                let response = self
                    .request(Method::GET, realm, &format!("roles/{role}"))
                    .send()
                    .await?;
                let representation: serde_json::Value =
                    decode(check(response, &format!("realm role {role}")).await?).await?;
                roles.push(representation);
            }

            let response = self
                .request(Method::POST, realm, &format!("groups/{id}/role-mappings/realm"))
                .json(&roles)
                .send()
                .await?;
            check(response, "group role mappings").await?;
        }

        Ok(id)
    }

    async fn delete_group(&self, realm: &str, name: &str) -> Result<(), KeycloakError> {
        let group = self.find_group(realm, name).await?;
        let id = group
            .id
            .ok_or_else(|| KeycloakError::Decode(format!("group {name} has no id")))?;

        let response = self
            .request(Method::DELETE, realm, &format!("groups/{id}"))
            .send()
            .await?;
        check(response, &format!("group {name}")).await?;
        Ok(())
    }

    async fn sync_auth_flow(&self, realm: &str, flow: &AuthFlow) -> Result<(), KeycloakError> {
        match self.find_auth_flow(realm, &flow.alias).await {
            Ok(existing) => {
                let id = existing.id.ok_or_else(|| {
                    KeycloakError::Decode(format!("auth flow {} has no id", flow.alias))
                })?;
                let mut body = flow.clone();
                body.id = Some(id.clone());

                let response = self
                    .request(Method::PUT, realm, &format!("authentication/flows/{id}"))
                    .json(&body)
                    .send()
                    .await?;
                check(response, "auth flow").await?;

                for execution in self.flow_executions(realm, &flow.alias).await? {
                    if execution.level != 0 {
                        continue;
                    }
                    let response = self
                        .request(
                            Method::DELETE,
                            realm,
                            &format!("authentication/executions/{}", execution.id),
                        )
                        .send()
                        .await?;
                    check(response, "flow execution").await?;
                }
            }
            Err(e) if e.is_not_found() => {
                let response = self
                    .request(Method::POST, realm, "authentication/flows")
                    .json(flow)
                    .send()
                    .await?;
                check(response, "auth flows").await?;
            }
            Err(e) => return Err(e),
        }

        let mut executions: Vec<&AuthenticationExecution> =
            flow.authentication_executions.iter().collect();
        executions.sort_by_key(|execution| execution.priority);

        for execution in executions {
            self.add_execution(realm, &flow.alias, execution).await?;
        }

        Ok(())
    }

    async fn delete_auth_flow(&self, realm: &str, alias: &str) -> Result<(), KeycloakError> {
        let flow = self.find_auth_flow(realm, alias).await?;
        let id = flow
            .id
            .ok_or_else(|| KeycloakError::Decode(format!("auth flow {alias} has no id")))?;

        let response = self
            .request(Method::DELETE, realm, &format!("authentication/flows/{id}"))
            .send()
            .await?;
        check(response, &format!("auth flow {alias}")).await?;
        Ok(())
    }

    async fn get_component(&self, realm: &str, name: &str) -> Result<Component, KeycloakError> {
        let response = self
            .request(Method::GET, realm, "components")
            .query(&[("name", name)])
            .send()
            .await?;
        let components: Vec<Component> = decode(check(response, "components").await?).await?;

        components
            .into_iter()
            .find(|component| component.name == name)
            .ok_or_else(|| KeycloakError::not_found(format!("component {name}")))
    }

    async fn create_component(
        &self,
        realm: &str,
        component: &Component,
    ) -> Result<(), KeycloakError> {
        let mut body = component.clone();
        if body.parent_id.is_none() {
            let response = self.request(Method::GET, realm, "").send().await?;
            let realm_ref: RealmRef = decode(check(response, &format!("realm {realm}")).await?).await?;
            body.parent_id = Some(realm_ref.id);
        }

        let response = self
            .request(Method::POST, realm, "components")
            .json(&body)
            .send()
            .await?;
        check(response, "components").await?;
        Ok(())
    }

    async fn update_component(
        &self,
        realm: &str,
        component: &Component,
    ) -> Result<(), KeycloakError> {
        let id = component.id.as_deref().ok_or_else(|| {
            KeycloakError::Decode(format!("component {} has no id", component.name))
        })?;

        let response = self
            .request(Method::PUT, realm, &format!("components/{id}"))
            .json(component)
            .send()
            .await?;
        check(response, "component").await?;
        Ok(())
    }

    async fn delete_component(&self, realm: &str, name: &str) -> Result<(), KeycloakError> {
        let component = self.get_component(realm, name).await?;
        let id = component
            .id
            .ok_or_else(|| KeycloakError::Decode(format!("component {name} has no id")))?;

        let response = self
            .request(Method::DELETE, realm, &format!("components/{id}"))
            .send()
            .await?;
        check(response, &format!("component {name}")).await?;
        Ok(())
    }
}

/// Map non-success statuses to typed errors
async fn check(response: Response, entity: &str) -> Result<Response, KeycloakError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        404 => KeycloakError::not_found(entity),
        code @ (400 | 401 | 403 | 409) => KeycloakError::Rejected {
            status: code,
            message,
        },
        code => KeycloakError::Status {
            status: code,
            message,
        },
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, KeycloakError> {
    response
        .json()
        .await
        .map_err(|e| KeycloakError::Decode(e.to_string()))
}

/// Id of a created object, the last segment of its `Location` header
fn created_id(response: &Response) -> Result<String, KeycloakError> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| KeycloakError::Decode("create response has no Location header".to_string()))
}
