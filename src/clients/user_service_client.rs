use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::models::UserId;
use crate::services::UserDirectory;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    name: Option<String>,
    username: Option<String>,
}

/// Looks up display names from the user service (`GET {base}/users/{id}`).
///
/// Answers, including "no such user", are cached for five idle minutes.
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
    jwt_secret: Option<String>,
    service_name: String,
    names: Cache<UserId, Option<String>>,
}

impl HttpUserDirectory {
    pub fn new(base_url: String, jwt_secret: Option<String>, service_name: String) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        let names = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();
        info!("User directory client created for {}", base_url);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            jwt_secret,
            service_name,
            names,
        })
    }

    fn generate_token(&self) -> Option<String> {
        let secret = self.jwt_secret.as_ref()?;
        let expiration = Utc::now().timestamp() + 60;
        let claims = Claims {
            sub: self.service_name.clone(),
            type_: "service".to_string(),
            exp: usize::try_from(expiration).unwrap_or(usize::MAX),
        };
        match encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())) {
            Ok(token) => Some(token),
            Err(e) => {
                error!("Failed to generate service JWT: {}", e);
                None
            }
        }
    }

    async fn fetch_name(&self, uid: &UserId) -> Result<Option<String>, String> {
        let url = format!("{}/users/{}", self.base_url, uid);
        let mut request = self.client.get(&url);
        if let Some(token) = self.generate_token() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| format!("Request to {} failed: {}", url, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(|e| format!("User service error: {}", e))?;
        let record: UserRecord = response.json().await.map_err(|e| format!("Invalid user record: {}", e))?;
        Ok(record.name.or(record.username))
    }
}

impl UserDirectory for HttpUserDirectory {
    fn display_name<'a>(&'a self, user: &'a UserId) -> BoxFuture<'a, Result<Option<String>, String>> {
        async move {
            if let Some(cached) = self.names.get(user).await {
                return Ok(cached);
            }
            let name = self.fetch_name(user).await?;
            self.names.insert(user.clone(), name.clone()).await;
            Ok(name)
        }
        .boxed()
    }
}
