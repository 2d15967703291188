use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;

pub type RecordId = String;

/// Timestamps are written as RFC 3339 with exactly three fractional digits,
/// so string order on stored documents is time order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

pub fn new_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    pub created_by: Option<RecordId>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub is_settled: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// Recomputes `total_amount` from what the contributors paid. Called on
    /// every write that carries contributors.
    pub fn recalculate_total(&mut self) {
        self.total_amount = self.contributors.iter().map(|c| c.amount_paid).sum();
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    #[serde(default)]
    pub user: Option<RecordId>,
    pub name: String,
    #[serde(default)]
    pub amount_paid: f64,
    #[serde(default)]
    pub amount_owed: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub bill: RecordId,
    #[serde(default)]
    pub description: String,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    pub category: String,
    pub amount: f64,
    pub payment_by: String,
    pub submitted_by: RecordId,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub icon: String,
    pub color: String,
    pub is_active: bool,
    pub created_by: Option<RecordId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_CATEGORY_ICON: &str = "tag";
pub const DEFAULT_CATEGORY_COLOR: &str = "#3B82F6";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// What clients get to see of a user. Never carries the password hash.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublicUser {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id.clone(),
            name: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: &'static str, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: &'static str) -> Self {
        ApiResponse {
            success: true,
            message: Some(message),
            data: None,
        }
    }
}
