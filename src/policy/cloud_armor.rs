//! Cloud Armor security policy store over the Compute Engine REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::auth::resolve_access_token;
use super::PolicyStore;
use crate::config::{Config, SecureString};
use crate::error::{Result, SyncError};
use crate::model::{PolicyRef, PolicySnapshot, RuleBatch};

/// Matcher version for source-range rules
const VERSIONED_EXPR: &str = "SRC_IPS_V1";

/// Upper bound on operations/wait calls for a single mutation.
/// Each call blocks server-side for up to two minutes.
const MAX_WAIT_POLLS: usize = 10;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecurityPolicyWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rules: Vec<RuleWire>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    matcher: Option<MatcherWire>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatcherWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    versioned_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<MatcherConfigWire>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatcherConfigWire {
    #[serde(default)]
    src_ip_ranges: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationWire {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<OperationErrorWire>,
    #[serde(default)]
    http_error_status_code: Option<u16>,
    #[serde(default)]
    http_error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorWire {
    #[serde(default)]
    errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Fixed parts of every managed rule.
#[derive(Debug, Clone)]
pub struct RuleTemplate {
    pub description: String,
    pub action: String,
}

impl RuleTemplate {
    fn build(&self, priority: u32, cidrs: &[String]) -> RuleWire {
        RuleWire {
            description: Some(self.description.clone()),
            priority: Some(i64::from(priority)),
            action: Some(self.action.clone()),
            matcher: Some(MatcherWire {
                versioned_expr: Some(VERSIONED_EXPR.to_string()),
                config: Some(MatcherConfigWire {
                    src_ip_ranges: cidrs.to_vec(),
                }),
            }),
        }
    }
}

/// Decode a security policy resource into a snapshot.
pub fn decode_snapshot(body: &str) -> Result<PolicySnapshot> {
    let wire: SecurityPolicyWire = serde_json::from_str(body).map_err(|e| {
        SyncError::operation("read-policy", None, format!("Malformed policy: {}", e))
    })?;

    let rules = wire
        .rules
        .into_iter()
        .filter_map(|rule| {
            let priority = rule.priority.and_then(|p| u32::try_from(p).ok());
            let Some(priority) = priority else {
                debug!("Skipping rule without a usable priority: {:?}", rule.priority);
                return None;
            };
            Some(RuleBatch {
                priority,
                cidrs: rule
                    .matcher
                    .and_then(|m| m.config)
                    .map(|c| c.src_ip_ranges)
                    .unwrap_or_default(),
                description: rule.description.unwrap_or_default(),
            })
        })
        .collect();

    Ok(PolicySnapshot {
        fingerprint: wire.fingerprint.unwrap_or_default(),
        version_marker: wire.description.unwrap_or_default(),
        rules,
    })
}

/// Map a failed HTTP status to the error taxonomy.
pub fn classify_status(
    operation: &'static str,
    priority: Option<u32>,
    status: StatusCode,
    detail: &str,
) -> SyncError {
    let message = if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    };
    let context = match priority {
        Some(p) => format!("{} at priority {}", operation, p),
        None => operation.to_string(),
    };
    match status {
        StatusCode::NOT_FOUND if operation == "read-policy" => SyncError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SyncError::Access(format!("{}: {}", context, message))
        }
        StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
            SyncError::Conflict(format!("{}: {}", context, message))
        }
        _ => SyncError::operation(operation, priority, message),
    }
}

/// Pull the human-readable message out of a Google API error body.
fn error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Inner,
    }
    #[derive(Deserialize)]
    struct Inner {
        #[serde(default)]
        message: String,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

/// Cloud Armor backed policy store
pub struct CloudArmorStore {
    client: Client,
    endpoint: String,
    token: SecureString,
    template: RuleTemplate,
}

impl CloudArmorStore {
    /// Build a store from configuration, resolving an access token.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(format!("flaresync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Auth(format!("Failed to create HTTP client: {}", e)))?;

        let token = resolve_access_token(&client, config).await?;

        Ok(Self {
            client,
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            token,
            template: RuleTemplate {
                description: config.rule_description.clone(),
                action: config.rule_action.clone(),
            },
        })
    }

    fn policy_url(&self, policy: &PolicyRef) -> String {
        format!(
            "{}/projects/{}/global/securityPolicies/{}",
            self.endpoint, policy.project, policy.policy
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.token.as_str())
    }

    /// Send a request and return the body of a successful response
    async fn send(
        &self,
        operation: &'static str,
        priority: Option<u32>,
        request: RequestBuilder,
    ) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::operation(operation, priority, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::operation(operation, priority, e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(operation, priority, status, &error_detail(&body)));
        }
        Ok(body)
    }

    /// Send a mutation and block until its operation is DONE
    async fn mutate(
        &self,
        operation: &'static str,
        priority: Option<u32>,
        policy: &PolicyRef,
        request: RequestBuilder,
    ) -> Result<()> {
        let body = self.send(operation, priority, request).await?;
        let mut op = parse_operation(operation, priority, &body)?;

        let mut polls = 0;
        while op.status != "DONE" {
            if polls == MAX_WAIT_POLLS {
                return Err(SyncError::operation(
                    operation,
                    priority,
                    format!("operation {} did not finish", op.name),
                ));
            }
            polls += 1;
            debug!("Waiting for operation {} ({})", op.name, op.status);

            let url = format!(
                "{}/projects/{}/global/operations/{}/wait",
                self.endpoint, policy.project, op.name
            );
            let body = self
                .send(operation, priority, self.request(Method::POST, &url))
                .await?;
            op = parse_operation(operation, priority, &body)?;
        }

        operation_result(operation, priority, &op)
    }
}

fn parse_operation(
    operation: &'static str,
    priority: Option<u32>,
    body: &str,
) -> Result<OperationWire> {
    serde_json::from_str(body).map_err(|e| {
        SyncError::operation(operation, priority, format!("Malformed operation: {}", e))
    })
}

/// Turn a finished operation into success or the matching error
fn operation_result(
    operation: &'static str,
    priority: Option<u32>,
    op: &OperationWire,
) -> Result<()> {
    let Some(error) = &op.error else {
        return Ok(());
    };

    let detail = error
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ");
    warn!("Operation {} finished with errors: {}", op.name, detail);

    let status = op
        .http_error_status_code
        .and_then(|code| StatusCode::from_u16(code).ok());
    match status {
        Some(status) => Err(classify_status(operation, priority, status, &detail)),
        None => Err(SyncError::operation(
            operation,
            priority,
            op.http_error_message.clone().unwrap_or(detail),
        )),
    }
}

#[async_trait]
impl PolicyStore for CloudArmorStore {
    async fn get_policy(&self, policy: &PolicyRef) -> Result<PolicySnapshot> {
        let url = self.policy_url(policy);
        let body = self
            .send("read-policy", None, self.request(Method::GET, &url))
            .await?;
        decode_snapshot(&body)
    }

    async fn patch_description(
        &self,
        policy: &PolicyRef,
        fingerprint: &str,
        description: &str,
    ) -> Result<()> {
        let url = self.policy_url(policy);
        let resource = SecurityPolicyWire {
            description: Some(description.to_string()),
            fingerprint: Some(fingerprint.to_string()),
            rules: Vec::new(),
        };
        let request = self.request(Method::PATCH, &url).json(&resource);
        self.mutate("patch-policy-description", None, policy, request)
            .await
    }

    async fn add_rule(&self, policy: &PolicyRef, priority: u32, cidrs: &[String]) -> Result<()> {
        let url = format!("{}/addRule", self.policy_url(policy));
        let request = self
            .request(Method::POST, &url)
            .json(&self.template.build(priority, cidrs));
        self.mutate("add-rule", Some(priority), policy, request)
            .await
    }

    async fn patch_rule(
        &self,
        policy: &PolicyRef,
        priority: u32,
        cidrs: &[String],
    ) -> Result<()> {
        let url = format!("{}/patchRule", self.policy_url(policy));
        let request = self
            .request(Method::POST, &url)
            .query(&[("priority", priority)])
            .json(&self.template.build(priority, cidrs));
        self.mutate("patch-rule", Some(priority), policy, request)
            .await
    }

    async fn remove_rule(&self, policy: &PolicyRef, priority: u32) -> Result<()> {
        let url = format!("{}/removeRule", self.policy_url(policy));
        let request = self
            .request(Method::POST, &url)
            .query(&[("priority", priority)]);
        self.mutate("remove-rule", Some(priority), policy, request)
            .await
    }
}
