//! `reqwest` implementation of [`SessionService`].

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{EndCallReport, JoinResponse, RateResponse, RatingSubmission, SessionLookup, SessionService};
use crate::call::IceServer;
use crate::error::{Error, Result};
use crate::session::Level;

/// Session service client over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpSessionService {
    client: Client,
    base_url: String,
}

impl HttpSessionService {
    /// Client rooted at `base_url` (e.g. `https://api.example.com/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Client sharing an existing connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        check_status(path, resp).await
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let resp = self.client.get(self.url(path)).send().await?;
        check_status(path, resp).await
    }
}

async fn check_status(path: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Http(format!("{} returned {}: {}", path, status, body.trim())))
}

async fn json_body<T: DeserializeOwned>(resp: Response) -> Result<T> {
    Ok(resp.json::<T>().await?)
}

// `/ice-servers` is either a bare list or wrapped in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum IceServersBody {
    List(Vec<IceServer>),
    Wrapped {
        #[serde(alias = "iceServers")]
        ice_servers: Vec<IceServer>,
    },
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn join_queue(&self, user_id: &str, level: Level) -> Result<JoinResponse> {
        let body = json!({ "user_id": user_id, "level": level });
        json_body(self.post("/matching/join", &body).await?).await
    }

    async fn session_for(&self, user_id: &str) -> Result<SessionLookup> {
        let path = format!("/matching/session/{}", urlencoding::encode(user_id));
        json_body(self.get(&path).await?).await
    }

    async fn leave_queue(&self, user_id: &str) -> Result<()> {
        self.post("/matching/leave", &json!({ "user_id": user_id }))
            .await
            .map(|_| ())
    }

    async fn end_call(&self, report: &EndCallReport) -> Result<()> {
        self.post("/matching/end", report)
            .await
            .map(|_| ())
            .map_err(|e| Error::BackendReport(e.to_string()))
    }

    async fn rate(&self, submission: &RatingSubmission) -> Result<RateResponse> {
        let resp = self
            .post("/matching/rate", submission)
            .await
            .map_err(|e| Error::BackendReport(e.to_string()))?;
        json_body(resp).await
    }

    async fn ice_servers(&self) -> Result<Vec<IceServer>> {
        let body: IceServersBody = json_body(self.get("/ice-servers").await?).await?;
        Ok(match body {
            IceServersBody::List(servers) => servers,
            IceServersBody::Wrapped { ice_servers } => ice_servers,
        })
    }
}
