//! GitHub REST payloads consumed by the syncer.
//!
//! Only the fields the syncer reads are typed; anything stored verbatim goes
//! through [`Payload`].

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A typed item together with the JSON object it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload<T> {
    pub item: T,
    pub raw: Value,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Payload<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let item = T::deserialize(&raw).map_err(D::Error::custom)?;
        Ok(Self { item, raw })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiUser {
    pub login: String,
}

/// Deleted accounts come back as `null`; GitHub renders those as "ghost".
pub fn login_of(user: &Option<ApiUser>) -> String {
    user.as_ref()
        .map(|u| u.login.clone())
        .unwrap_or_else(|| "ghost".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRepository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: ApiUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPullRequest {
    pub id: i64,
    pub number: i64,
    pub user: Option<ApiUser>,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiIssueEvent {
    pub event: String,
    pub created_at: DateTime<Utc>,
}

impl ApiIssueEvent {
    pub const READY_FOR_REVIEW: &'static str = "ready_for_review";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFile {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub additions: i64,
    #[serde(default)]
    pub deletions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiReview {
    pub id: i64,
    pub user: Option<ApiUser>,
    pub state: String,
    /// Pending reviews have not been submitted yet.
    pub submitted_at: Option<DateTime<Utc>>,
    pub commit_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_keeps_unknown_fields() {
        let raw = json!({
            "id": 7,
            "number": 42,
            "user": {"login": "octocat", "id": 1},
            "title": "Add feature",
            "body": null,
            "state": "open",
            "draft": true,
            "merged_at": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "labels": [{"name": "bug"}]
        });

        let payload: Payload<ApiPullRequest> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(payload.item.number, 42);
        assert!(payload.item.draft);
        assert_eq!(payload.raw, raw);
        assert_eq!(payload.raw["labels"][0]["name"], "bug");
    }

    #[test]
    fn ghost_user_falls_back() {
        let review: ApiReview = serde_json::from_value(json!({
            "id": 1,
            "user": null,
            "state": "PENDING",
            "commit_id": null
        }))
        .unwrap();
        assert_eq!(login_of(&review.user), "ghost");
        assert!(review.submitted_at.is_none());
    }
}
