//! API Client
//!
//! HTTP client for the Airzone Cloud REST API.

use anyhow::{bail, Context, Result};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use crate::cloud::types::{
    CloudNotification, Installation, InstallationsResponse, LoginRequest, LoginResponse,
    NotificationsResponse,
};

pub struct AirzoneClient {
    client: reqwest::Client,
    base_url: String,
}

impl AirzoneClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    /// Log in and return the bearer token
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        debug!(email = %email, "Logging in to Airzone Cloud");

        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Login failed with HTTP status {}", status);
        }

        let body: LoginResponse = response
            .json()
            .await
            .context("Invalid login response")?;

        info!(
            email = %body.email,
            name = %body.data.name,
            last_name = %body.data.last_name,
            "Logged in to Airzone Cloud"
        );
        Ok(body.token)
    }

    /// Fetch the most recent cloud notification
    pub async fn notifications(&self, token: &str, lang: &str) -> Result<Vec<CloudNotification>> {
        let body: NotificationsResponse = self
            .get(
                token,
                "/notifications",
                &[
                    ("lang", lang),
                    ("page", "0"),
                    ("items", "1"),
                    ("order", "desc"),
                    ("sort", "dt"),
                    ("platform", "web"),
                ],
            )
            .await?;
        Ok(body.notifications)
    }

    /// Fetch the unread cloud notifications and log them
    pub async fn log_unread_notifications(&self, token: &str, lang: &str) -> Result<usize> {
        let unread: Vec<_> = self
            .notifications(token, lang)
            .await?
            .into_iter()
            .filter(|n| !n.data.read)
            .collect();

        for notification in &unread {
            info!(
                date = %notification.data.date(),
                title = %notification.data.title,
                "Unread Airzone notification"
            );
        }
        Ok(unread.len())
    }

    pub async fn installations(&self, token: &str) -> Result<Vec<Installation>> {
        let body: InstallationsResponse = self.get(token, "/installations", &[]).await?;
        debug!(count = body.installations.len(), "Installations fetched");
        Ok(body.installations)
    }

    /// Find an installation by its exact name
    pub async fn find_installation(&self, token: &str, name: &str) -> Result<Installation> {
        let installation = self
            .installations(token)
            .await?
            .into_iter()
            .find(|installation| installation.name == name)
            .with_context(|| format!("Installation named '{}' not found", name))?;

        info!(
            installation = %installation.name,
            installation_id = %installation.id,
            "Installation selected"
        );
        Ok(installation)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {} failed with HTTP status {}", path, status);
        }

        response
            .json()
            .await
            .with_context(|| format!("Invalid response from {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_login_returns_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "me@example.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_id": "u1",
                "email": "me@example.com",
                "data": { "name": "Ada", "lastName": "Lovelace" },
                "token": "jwt-token",
                "refreshToken": "refresh"
            })))
            .mount(&server)
            .await;

        let client = AirzoneClient::new(&server.uri()).unwrap();
        let token = client.login("me@example.com", "pw").await.unwrap();
        assert_eq!(token, "jwt-token");
    }

    #[tokio::test]
    async fn test_login_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = AirzoneClient::new(&server.uri()).unwrap();
        let err = client.login("me@example.com", "bad").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_find_installation_by_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/installations"))
            .and(header("authorization", "Bearer jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "installations": [
                    { "installation_id": "i1", "name": "Chalet" },
                    { "installation_id": "i2", "name": "Maison", "access_type": "admin" }
                ]
            })))
            .mount(&server)
            .await;

        let client = AirzoneClient::new(&server.uri()).unwrap();
        let installation = client.find_installation("jwt", "Maison").await.unwrap();
        assert_eq!(
            installation,
            Installation {
                id: "i2".to_string(),
                name: "Maison".to_string()
            }
        );

        let err = client.find_installation("jwt", "Garage").await.unwrap_err();
        assert!(err.to_string().contains("Garage"));
    }

    #[tokio::test]
    async fn test_unread_notifications() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/notifications"))
            .and(query_param("lang", "fr"))
            .and(query_param("items", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "notifications": [
                    { "data": { "label": "l", "title": "Filtre", "body": "", "read": false, "dt": 1700000000000i64 } },
                    { "data": { "label": "l", "title": "Ancienne", "body": "", "read": true, "dt": 1600000000000i64 } }
                ]
            })))
            .mount(&server)
            .await;

        let client = AirzoneClient::new(&server.uri()).unwrap();
        assert_eq!(client.log_unread_notifications("jwt", "fr").await.unwrap(), 1);
    }
}
