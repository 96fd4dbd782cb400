//! Session object as returned by `GET /matching/session/{user_id}`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Session object as the matching service sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// First participant; the initiator
    #[serde(deserialize_with = "id_string")]
    pub user1_id: String,
    /// Second participant; the receiver
    #[serde(deserialize_with = "id_string")]
    pub user2_id: String,
    /// Level name (`beginner`, `intermediate`, `advanced`)
    #[serde(alias = "english_level")]
    pub level: String,
    /// Creation time; anchors the countdown
    #[serde(deserialize_with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// The other participant, from the caller's point of view
    #[serde(default)]
    pub partner: Option<PartnerInfo>,
}

/// `partner` sub-object of [`SessionInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerInfo {
    /// Partner user id
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Partner display name
    pub username: String,
}

/// Parse a timestamp in RFC 3339 or SQLite `YYYY-MM-DD HH:MM:SS` (UTC) form.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("unrecognised timestamp {:?}: {}", raw, e))
}

fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", ms))),
        Raw::Text(text) => parse_timestamp(&text).map_err(D::Error::custom),
    }
}

// Ids come back as integers from some deployments.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}
