//! Linear GraphQL client
//!
//! Issues are looked up with a description `contains` filter on the
//! idempotency key, then created with `issueCreate` if nothing matched.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::IssueTracker;
use crate::config::PublishConfig;
use crate::error::{Error, Result};
use crate::types::{IdempotencyKey, IssueId};

const FIND_ISSUE_QUERY: &str = r#"
query FindIssue($key: String!) {
  issues(first: 1, filter: { description: { contains: $key } }) {
    nodes { id identifier url }
  }
}"#;

const FIRST_TEAM_QUERY: &str = r#"
query {
  teams(first: 1) {
    nodes { id name }
  }
}"#;

const CREATE_ISSUE_MUTATION: &str = r#"
mutation IssueCreate($input: IssueCreateInput!) {
  issueCreate(input: $input) {
    success
    issue { id identifier url }
  }
}"#;

/// Status used for failures that never reached an HTTP response.
const NETWORK_STATUS: &str = "network";
/// Status used for GraphQL-level errors on a 200 response.
const GRAPHQL_STATUS: &str = "graphql";

/// Blocking Linear API client.
pub struct LinearClient {
    endpoint: String,
    team_id: Option<String>,
    max_retries: usize,
    runtime: tokio::runtime::Runtime,
    http_client: reqwest::Client,
}

impl LinearClient {
    pub fn new(config: &PublishConfig) -> Result<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            Error::Config("publish.api_key (or LINEAR_API_KEY) is required".to_string())
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&api_key)
                .map_err(|e| Error::Config(format!("invalid publish api_key: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to build tokio runtime: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint(),
            team_id: config.team_id.clone(),
            max_retries: config.max_retries,
            runtime,
            http_client,
        })
    }

    /// Single GraphQL round trip.
    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: &Value) -> Result<T> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| publish_error(NETWORK_STATUS, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| publish_error(NETWORK_STATUS, format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(publish_error(status.as_u16().to_string(), text));
        }
        parse_response(&text)
    }

    /// Retries transient failures (5xx, 429, network) with exponential backoff.
    async fn execute_with_retry<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: &Value,
    ) -> Result<T> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying Linear request (attempt {}/{}), waiting {:?}",
                    attempt + 1,
                    self.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self.execute(query, variables).await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable_error(&e) => {
                    tracing::warn!(error = %e, "Transient error talking to Linear");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| publish_error(NETWORK_STATUS, "max retries exceeded")))
    }

    fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        self.runtime
            .block_on(self.execute_with_retry(query, &variables))
    }

    /// Configured team, or the first team visible to the API key.
    fn resolve_team(&self) -> Result<String> {
        if let Some(team_id) = &self.team_id {
            return Ok(team_id.clone());
        }
        let data: TeamsData = self.graphql(FIRST_TEAM_QUERY, json!({}))?;
        let team = data
            .teams
            .nodes
            .into_iter()
            .next()
            .ok_or_else(|| publish_error(GRAPHQL_STATUS, "no Linear teams visible to this key"))?;
        tracing::info!(team = %team.name, team_id = %team.id, "Using first Linear team");
        Ok(team.id)
    }
}

impl IssueTracker for LinearClient {
    fn find_issue(&self, key: &IdempotencyKey) -> Result<Option<IssueId>> {
        let data: IssuesData = self.graphql(FIND_ISSUE_QUERY, json!({ "key": key.as_str() }))?;
        Ok(data.issues.nodes.into_iter().next().map(IssueNode::into_issue_id))
    }

    fn create_issue(&self, title: &str, body: &str, _key: &IdempotencyKey) -> Result<IssueId> {
        let team_id = self.resolve_team()?;
        let variables = json!({
            "input": {
                "title": title,
                "description": body,
                "teamId": team_id,
            }
        });
        let data: IssueCreateData = self.graphql(CREATE_ISSUE_MUTATION, variables)?;
        created_issue(data)
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct IssuesData {
    issues: Nodes<IssueNode>,
}

#[derive(Debug, Deserialize)]
struct TeamsData {
    teams: Nodes<TeamNode>,
}

#[derive(Debug, Deserialize)]
struct TeamNode {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCreateData {
    issue_create: IssueCreatePayload,
}

#[derive(Debug, Deserialize)]
struct IssueCreatePayload {
    success: bool,
    issue: Option<IssueNode>,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    id: String,
    /// Human-readable key such as `ENG-42`
    identifier: Option<String>,
    url: Option<String>,
}

impl IssueNode {
    fn into_issue_id(self) -> IssueId {
        IssueId {
            id: self.identifier.unwrap_or(self.id),
            url: self.url,
        }
    }
}

fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T> {
    let response: GraphqlResponse<T> = serde_json::from_str(text)
        .map_err(|e| publish_error(GRAPHQL_STATUS, format!("failed to parse response: {}", e)))?;
    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(publish_error(GRAPHQL_STATUS, messages.join("; ")));
    }
    response
        .data
        .ok_or_else(|| publish_error(GRAPHQL_STATUS, "response has no data"))
}

fn created_issue(data: IssueCreateData) -> Result<IssueId> {
    match data.issue_create {
        IssueCreatePayload {
            success: true,
            issue: Some(issue),
        } => Ok(issue.into_issue_id()),
        _ => Err(publish_error(GRAPHQL_STATUS, "issueCreate did not succeed")),
    }
}

fn publish_error(status: impl Into<String>, message: impl Into<String>) -> Error {
    Error::Publish {
        status: status.into(),
        message: message.into(),
    }
}

/// Check if an error is retryable (transient)
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Publish { status, .. } => {
            status == NETWORK_STATUS
                || status == "429"
                || status.parse::<u16>().is_ok_and(|code| (500..600).contains(&code))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_with_key() {
        let config = PublishConfig {
            api_key: Some("lin_api_test".to_string()),
            ..Default::default()
        };
        assert!(LinearClient::new(&config).is_ok());
    }

    #[test]
    fn test_parse_find_response() {
        let data: IssuesData = parse_response(
            r#"{"data":{"issues":{"nodes":[{"id":"uuid-1","identifier":"ENG-7","url":"https://linear.app/x/issue/ENG-7"}]}}}"#,
        )
        .unwrap();
        let found = data.issues.nodes.into_iter().next().map(IssueNode::into_issue_id);
        assert_eq!(
            found,
            Some(IssueId {
                id: "ENG-7".to_string(),
                url: Some("https://linear.app/x/issue/ENG-7".to_string()),
            })
        );

        let empty: IssuesData = parse_response(r#"{"data":{"issues":{"nodes":[]}}}"#).unwrap();
        assert!(empty.issues.nodes.is_empty());
    }

    #[test]
    fn test_graphql_errors_surface_as_publish_errors() {
        let err = parse_response::<IssuesData>(
            r#"{"data":null,"errors":[{"message":"Authentication required"}]}"#,
        )
        .unwrap_err();
        match err {
            Error::Publish { status, message } => {
                assert_eq!(status, GRAPHQL_STATUS);
                assert_eq!(message, "Authentication required");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failed_create_is_error() {
        let data: IssueCreateData =
            parse_response(r#"{"data":{"issueCreate":{"success":false,"issue":null}}}"#).unwrap();
        assert!(created_issue(data).is_err());
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&publish_error("503", "unavailable")));
        assert!(is_retryable_error(&publish_error("429", "slow down")));
        assert!(is_retryable_error(&publish_error(NETWORK_STATUS, "timeout")));
        assert!(!is_retryable_error(&publish_error("400", "bad request")));
        assert!(!is_retryable_error(&publish_error(GRAPHQL_STATUS, "bad input")));
    }
}
