//! Client for the remote profile/presence service.
//!
//! Four read-only endpoints: batch username resolution, per-user profile,
//! per-user avatar metadata, and batch presence. Raw responses are
//! deserialized into lenient all-optional records and compacted into the
//! fixed snapshot field set, so partial or malformed payloads degrade to
//! defaults instead of failing the pass.

use crate::config::ApiConfig;
use crate::retry::{with_retries, RequestError, RetryPolicy};
use crate::snapshot::{AvatarFields, PresenceFields, ProfileFields};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;


const USER_AGENT: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"), " (public-data monitor)");

/// HTTP client for the remote service, with retry bounds applied to
/// every request.
pub struct RemoteClient {
    http: reqwest::Client,
    api: ApiConfig,
    policy: RetryPolicy,
}

impl RemoteClient {
    pub fn new(api: ApiConfig, timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, api, policy })
    }

    /// Resolve usernames to stable identifiers in one batched call.
    ///
    /// Names the service does not recognize are first matched
    /// case-insensitively against the resolved set, then left out of the
    /// returned map. Total failure here is fatal only at startup, which
    /// is the only time this is called.
    pub async fn resolve_usernames(&self, usernames: &[String]) -> Result<HashMap<String, u64>> {
        let url = format!("{}/v1/usernames/users", self.api.users_base);
        let body = json!({ "usernames": usernames, "excludeBannedUsers": false });

        let response: ResolveResponse =
            with_retries(self.policy, "resolve_usernames", || self.post_json(&url, &body))
                .await
                .context("Username resolution failed")?;

        let mut mapping = HashMap::new();
        for entry in response.data {
            let Some(id) = entry.id else { continue };
            if let Some(requested) = entry.requested_username.or(entry.name) {
                mapping.insert(requested, id);
            }
        }

        apply_case_insensitive_fallback(usernames, &mut mapping);

        Ok(mapping)
    }

    /// Fetch and compact one user's profile attributes.
    pub async fn fetch_profile(&self, id: u64) -> Result<ProfileFields, RequestError> {
        let url = format!("{}/v1/users/{}", self.api.users_base, id);
        let raw: RawProfile =
            with_retries(self.policy, "fetch_profile", || self.get_json(&url)).await?;
        Ok(raw.compact())
    }

    /// Fetch and compact one user's avatar metadata.
    pub async fn fetch_avatar(&self, id: u64) -> Result<AvatarFields, RequestError> {
        let url = format!("{}/v1/users/{}/avatar", self.api.avatar_base, id);
        let raw: RawAvatar =
            with_retries(self.policy, "fetch_avatar", || self.get_json(&url)).await?;
        Ok(raw.compact())
    }

    /// Fetch presence for all tracked users in one batched call.
    ///
    /// Identifiers missing from the response map to an empty presence,
    /// never an error. The service sometimes returns a bare list and
    /// sometimes wraps it in a data envelope; both shapes are accepted.
    pub async fn fetch_presence_batch(
        &self,
        ids: &[u64],
    ) -> Result<HashMap<u64, PresenceFields>, RequestError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/v1/presence/users", self.api.presence_base);
        let body = json!({ "userIds": ids });
        let response: PresenceResponse =
            with_retries(self.policy, "fetch_presence", || self.post_json(&url, &body)).await?;

        let mut map = HashMap::new();
        for raw in response.into_entries() {
            if let Some(id) = raw.user_id {
                map.insert(id, raw.compact());
            }
        }
        for id in ids {
            map.entry(*id).or_default();
        }
        Ok(map)
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Default,
    {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RequestError::Transient(anyhow::Error::new(e)))?;
        decode(check_status(response)?).await
    }

    async fn post_json<T>(&self, url: &str, body: &impl Serialize) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Default,
    {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| RequestError::Transient(anyhow::Error::new(e)))?;
        decode(check_status(response)?).await
    }
}

/// Requested names with no exact match are retried against the resolved
/// set case-insensitively before being given up on. Names still missing
/// afterwards stay absent from the map.
fn apply_case_insensitive_fallback(requested: &[String], mapping: &mut HashMap<String, u64>) {
    for name in requested {
        if !mapping.contains_key(name) {
            let found = mapping
                .iter()
                .find(|(resolved, _)| resolved.eq_ignore_ascii_case(name))
                .map(|(_, id)| *id);
            if let Some(id) = found {
                mapping.insert(name.clone(), id);
            }
        }
    }
}

/// Classify the response status: 429 becomes a rate limit carrying the
/// server's Retry-After hint, any other non-success is transient.
/// Shared with the webhook sender, which needs the same classification.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RequestError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        return Err(RequestError::RateLimited { retry_after });
    }
    if !status.is_success() {
        return Err(RequestError::Transient(anyhow!(
            "request to {} failed with status {}",
            response.url(),
            status
        )));
    }
    Ok(response)
}

/// Retry-After arrives in seconds, occasionally fractional; round up to
/// whole milliseconds. Anything non-finite or negative is discarded.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_millis((seconds * 1000.0).ceil() as u64))
}

/// A payload that fails to deserialize is treated as an empty fragment,
/// not an error worth retrying.
async fn decode<T>(response: reqwest::Response) -> Result<T, RequestError>
where
    T: DeserializeOwned + Default,
{
    let url = response.url().clone();
    match response.json::<T>().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(url = %url, error = %e, "Malformed response payload, using defaults");
            Ok(T::default())
        }
    }
}

// ---- Raw response records (lenient, all fields optional) ----

#[derive(Debug, Default, Deserialize)]
struct ResolveResponse {
    #[serde(default)]
    data: Vec<RawResolvedUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResolvedUser {
    #[serde(default)]
    requested_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RawProfile {
    fn compact(self) -> ProfileFields {
        ProfileFields {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            display_name: self.display_name.unwrap_or_default(),
            created: self.created.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAvatar {
    #[serde(default)]
    player_avatar_type: Option<String>,
    #[serde(default)]
    assets: Option<Vec<serde_json::Value>>,
}

impl RawAvatar {
    fn compact(self) -> AvatarFields {
        AvatarFields {
            avatar_type: self.player_avatar_type.unwrap_or_default(),
            asset_count: self.assets.map(|a| a.len() as u64).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PresenceResponse {
    Wrapped {
        #[serde(default)]
        data: Vec<RawPresence>,
    },
    List(Vec<RawPresence>),
}

impl Default for PresenceResponse {
    fn default() -> Self {
        Self::Wrapped { data: Vec::new() }
    }
}

impl PresenceResponse {
    fn into_entries(self) -> Vec<RawPresence> {
        match self {
            Self::Wrapped { data } => data,
            Self::List(list) => list,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPresence {
    #[serde(default)]
    user_id: Option<u64>,
    #[serde(default)]
    user_presence_type: Option<i64>,
    #[serde(default)]
    last_location: Option<String>,
    #[serde(default)]
    place_id: Option<u64>,
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    last_online: Option<String>,
}

impl RawPresence {
    fn compact(self) -> PresenceFields {
        PresenceFields {
            presence_type: self.user_presence_type,
            last_location: self.last_location.unwrap_or_default(),
            place_id: self.place_id,
            game_id: self.game_id,
            last_online: self.last_online,
        }
    }
}
