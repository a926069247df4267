//! Remote directory REST API client.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::logs::{LogEntry, LogSource};
use crate::config::DirectoryConfig;
use crate::errors::RemoteError;
use crate::models::{RemoteGroup, RemoteIdentity, RemoteSnapshot};

const USERS_ENDPOINT: &str = "users/";
const GROUPS_ENDPOINT: &str = "groups/";

/// Timestamp format accepted by the log endpoints.
const LOG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// Envelope used by every listing endpoint.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

/// A listed user. Accounts without a POSIX uid have `uid` null or absent.
#[derive(Debug, Deserialize)]
struct ListedUser {
    username: String,
    uid: Option<u32>,
    #[serde(default)]
    gid: Option<u32>,
}

/// A listed group. Non-POSIX groups have no `gid`.
#[derive(Debug, Deserialize)]
struct ListedGroup {
    name: String,
    gid: Option<u32>,
    #[serde(default)]
    members: Vec<String>,
}

/// One page of log entries.
#[derive(Debug, Deserialize)]
struct LogPage {
    #[serde(default)]
    data: Vec<LogEntry>,
    #[serde(rename = "numPages", default)]
    num_pages: u32,
}

#[derive(Debug, Serialize)]
struct LogQuery<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ascending: Option<bool>,
}

/// Asynchronous client for the remote directory API.
#[derive(Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    api_url: String,
}

impl DirectoryClient {
    /// Build a client from the directory settings. Fails if no API key has
    /// been resolved.
    pub fn new(config: &DirectoryConfig) -> Result<Self, RemoteError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RemoteError::MissingApiKey {
                env_var: config.api_key_env.clone(),
            })?;

        let mut auth = HeaderValue::from_str(&format!("Token {}", api_key))
            .map_err(|e| RemoteError::Client(format!("invalid API key: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("uidsync/", env!("CARGO_PKG_VERSION"))),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        let api_url = config.api_url.trim_end_matches('/').to_string();
        info!(api_url = %api_url, timeout_secs = config.timeout_secs, "created DirectoryClient");
        Ok(Self { http, api_url })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_url, endpoint)
    }

    /// POSIX users only; entries without a uid are dropped.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<RemoteIdentity>, RemoteError> {
        let listed: Vec<ListedUser> = self.get_listing(USERS_ENDPOINT).await?;
        let total = listed.len();
        let users: Vec<RemoteIdentity> = listed
            .into_iter()
            .filter_map(|u| match u.uid {
                Some(uid) => Some(RemoteIdentity {
                    name: u.username,
                    uid,
                    gid: u.gid,
                }),
                None => {
                    debug!(user = %u.username, "skipping remote user without uid");
                    None
                }
            })
            .collect();
        debug!(count = users.len(), skipped = total - users.len(), "fetched remote users");
        Ok(users)
    }

    /// POSIX groups only; entries without a gid are dropped.
    #[instrument(skip(self))]
    pub async fn list_groups(&self) -> Result<Vec<RemoteGroup>, RemoteError> {
        let listed: Vec<ListedGroup> = self.get_listing(GROUPS_ENDPOINT).await?;
        let total = listed.len();
        let groups: Vec<RemoteGroup> = listed
            .into_iter()
            .filter_map(|g| match g.gid {
                Some(gid) => Some(RemoteGroup {
                    name: g.name,
                    gid,
                    members: g.members,
                }),
                None => {
                    debug!(group = %g.name, "skipping remote group without gid");
                    None
                }
            })
            .collect();
        debug!(count = groups.len(), skipped = total - groups.len(), "fetched remote groups");
        Ok(groups)
    }

    /// Fetch users and groups concurrently. Either failure aborts both.
    pub async fn fetch_snapshot(&self) -> Result<RemoteSnapshot, RemoteError> {
        let (users, groups) = tokio::try_join!(self.list_users(), self.list_groups())?;
        info!(
            users = users.len(),
            groups = groups.len(),
            "loaded remote snapshot"
        );
        Ok(RemoteSnapshot { users, groups })
    }

    /// Pull every page of `source` logs in `[from, to]`, oldest first.
    #[instrument(skip(self))]
    pub async fn logs(
        &self,
        source: LogSource,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>, RemoteError> {
        let endpoint = source.endpoint();
        let from = from.format(LOG_TIME_FORMAT).to_string();
        let to = to.format(LOG_TIME_FORMAT).to_string();

        let first: LogPage = self
            .post_json(
                endpoint,
                &LogQuery {
                    from: &from,
                    to: &to,
                    page: None,
                    ascending: None,
                },
            )
            .await?;
        debug!(pages = first.num_pages, "log page count");

        let mut entries = Vec::new();
        for page in 1..=first.num_pages {
            let body: LogPage = self
                .post_json(
                    endpoint,
                    &LogQuery {
                        from: &from,
                        to: &to,
                        page: Some(page),
                        ascending: Some(true),
                    },
                )
                .await?;
            entries.extend(body.data);
        }
        info!(%source, count = entries.len(), "fetched logs");
        Ok(entries)
    }

    async fn get_listing<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, RemoteError> {
        let resp = self
            .http
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| RemoteError::unavailable(endpoint, e))?;
        let envelope: DataEnvelope<T> = decode(endpoint, resp).await?;
        Ok(envelope.data)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let resp = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::unavailable(endpoint, e))?;
        decode(endpoint, resp).await
    }
}

/// Reject non-success statuses, then decode the JSON body.
async fn decode<T: DeserializeOwned>(endpoint: &str, resp: reqwest::Response) -> Result<T, RemoteError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RemoteError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    resp.json()
        .await
        .map_err(|e| RemoteError::unavailable(endpoint, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(base: &str) -> DirectoryConfig {
        DirectoryConfig {
            api_url: format!("{}/v1/", base),
            api_key: Some("secret-token".into()),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_api_key() {
        let cfg = DirectoryConfig::default();
        let result = DirectoryClient::new(&cfg);
        assert!(matches!(result, Err(RemoteError::MissingApiKey { .. })));
    }

    #[tokio::test]
    async fn test_fetch_snapshot_sends_token() {
        let server = MockServer::start_async().await;
        let users = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/users/")
                    .header("authorization", "Token secret-token");
                then.status(200).json_body(json!({
                    "data": [{"username": "alice", "uid": 2005, "email": "a@example.com"}]
                }));
            })
            .await;
        let groups = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/groups/")
                    .header("authorization", "Token secret-token");
                then.status(200)
                    .json_body(json!({"data": [{"name": "devs", "gid": 3100}]}));
            })
            .await;

        let client = DirectoryClient::new(&config(&server.base_url())).unwrap();
        let snapshot = client.fetch_snapshot().await.unwrap();

        users.assert_async().await;
        groups.assert_async().await;
        assert_eq!(snapshot.users[0].name, "alice");
        assert_eq!(snapshot.users[0].uid, 2005);
        assert_eq!(snapshot.groups[0].gid, 3100);
    }

    #[tokio::test]
    async fn test_server_error_is_remote_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/users/");
                then.status(500).body("internal error");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/groups/");
                then.status(200).json_body(json!({"data": []}));
            })
            .await;

        let client = DirectoryClient::new(&config(&server.base_url())).unwrap();
        let err = client.fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/groups/");
                then.status(200).body("not json");
            })
            .await;

        let client = DirectoryClient::new(&config(&server.base_url())).unwrap();
        let err = client.list_groups().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_event_logs_walks_pages() {
        let server = MockServer::start_async().await;
        let count = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/logs/event/")
                    .json_body(json!({"from": "2026-10-01T00:00Z", "to": "2026-10-08T00:00Z"}));
                then.status(200).json_body(json!({"numPages": 2, "data": []}));
            })
            .await;
        let page1 = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/logs/event/").json_body(json!({
                    "from": "2026-10-01T00:00Z", "to": "2026-10-08T00:00Z",
                    "page": 1, "ascending": true
                }));
                then.status(200).json_body(json!({"numPages": 2, "data": [
                    {"timestamp": "2026-10-01T10:00Z", "event_type": "login", "data": {"user": "alice"}}
                ]}));
            })
            .await;
        let page2 = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/logs/event/").json_body(json!({
                    "from": "2026-10-01T00:00Z", "to": "2026-10-08T00:00Z",
                    "page": 2, "ascending": true
                }));
                then.status(200).json_body(json!({"numPages": 2, "data": [
                    {"timestamp": "2026-10-02T10:00Z", "event_type": "logout", "data": {"user": "bob"}}
                ]}));
            })
            .await;

        let client = DirectoryClient::new(&config(&server.base_url())).unwrap();
        let from = DateTime::parse_from_rfc3339("2026-10-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let to = DateTime::parse_from_rfc3339("2026-10-08T00:00:00Z").unwrap().with_timezone(&Utc);
        let logs = client.logs(LogSource::Event, from, to).await.unwrap();

        count.assert_async().await;
        page1.assert_async().await;
        page2.assert_async().await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].field("event_type").as_deref(), Some("login"));
        assert_eq!(logs[1].field("data.user").as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_radius_logs_use_their_endpoint() {
        let server = MockServer::start_async().await;
        let count = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/logs/radius/")
                    .json_body(json!({"from": "2026-10-01T00:00Z", "to": "2026-10-08T00:00Z"}));
                then.status(200).json_body(json!({"numPages": 1, "data": []}));
            })
            .await;
        let page1 = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/logs/radius/").json_body(json!({
                    "from": "2026-10-01T00:00Z", "to": "2026-10-08T00:00Z",
                    "page": 1, "ascending": true
                }));
                then.status(200).json_body(json!({"numPages": 1, "data": [
                    {"timestamp": "2026-10-03T08:00Z", "username": "alice",
                     "ipAddress": "10.0.0.1", "message": "Access-Accept", "success": true}
                ]}));
            })
            .await;

        let client = DirectoryClient::new(&config(&server.base_url())).unwrap();
        let from = DateTime::parse_from_rfc3339("2026-10-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let to = DateTime::parse_from_rfc3339("2026-10-08T00:00:00Z").unwrap().with_timezone(&Utc);
        let logs = client.logs(LogSource::Radius, from, to).await.unwrap();

        count.assert_async().await;
        page1.assert_async().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].field("ipAddress").as_deref(), Some("10.0.0.1"));
        assert_eq!(logs[0].field("success").as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_non_posix_entries_skipped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/users/");
                then.status(200).json_body(json!({"data": [
                    {"username": "alice", "uid": 2005},
                    {"username": "sso-only", "uid": null},
                    {"username": "no-uid-key"}
                ]}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/groups/");
                then.status(200).json_body(json!({"data": [
                    {"name": "devs", "gid": 3100, "members": ["alice"]},
                    {"name": "saml-app", "gid": null}
                ]}));
            })
            .await;

        let client = DirectoryClient::new(&config(&server.base_url())).unwrap();
        let snapshot = client.fetch_snapshot().await.unwrap();

        let users: Vec<_> = snapshot.users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(users, vec!["alice"]);
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.groups[0].members, vec!["alice".to_string()]);
    }
}
