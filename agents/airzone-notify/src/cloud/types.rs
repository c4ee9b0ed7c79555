//! Airzone Cloud API types

use serde::{Deserialize, Serialize};

/// The site whose devices are monitored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    #[serde(rename = "installation_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub data: UserData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<CloudNotification>,
}

/// A notification stored by the Airzone Cloud
#[derive(Debug, Clone, Deserialize)]
pub struct CloudNotification {
    pub data: CloudNotificationData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudNotificationData {
    #[serde(default)]
    pub label: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub read: bool,
    /// Milliseconds since the Unix epoch
    pub dt: i64,
}

impl CloudNotificationData {
    /// Timestamp formatted as RFC 3339, or the raw value if out of range
    pub fn date(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.dt)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.dt.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct InstallationsResponse {
    pub installations: Vec<Installation>,
}
