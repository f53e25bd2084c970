use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::error::HttpError;

/// Thin JSON client shared by the executor and scheduler adapters.
#[derive(Clone)]
pub struct HttpClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: &str, api_key: &str, timeout_ms: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, HttpError> {
        let url = self.url(path);
        let req = self.http.get(&url);
        self.send(req, url).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, HttpError> {
        let url = self.url(path);
        let req = self.http.post(&url).json(body);
        self.send(req, url).await
    }

    pub async fn post_query<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<Value, HttpError> {
        let url = self.url(path);
        let req = self.http.post(&url).query(query);
        self.send(req, url).await
    }

    pub async fn post_empty(&self, path: &str) -> Result<Value, HttpError> {
        let url = self.url(path);
        let req = self.http.post(&url);
        self.send(req, url).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, HttpError> {
        let url = self.url(path);
        let req = self.http.delete(&url);
        self.send(req, url).await
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: String) -> Result<Value, HttpError> {
        tracing::trace!(target: "taskpulse.http", url = %url, "request");
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| HttpError::from_reqwest(err, url.clone()))?;
        let status = resp.status();
        let value = parse_json_response(resp).await?;
        tracing::trace!(target: "taskpulse.http", url = %url, status = %status, "response");
        Ok(value)
    }
}

async fn parse_json_response(resp: reqwest::Response) -> Result<Value, HttpError> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| HttpError::from_reqwest(err, url.clone()))?;

    if !status.is_success() {
        return Err(HttpError::status_error(status.as_u16(), url, &body));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str::<Value>(&body)
        .map_err(|err| HttpError::decode_error(status.as_u16(), url, err, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpErrorKind;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_bearer_sent_when_key_set() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/tasks")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = HttpClient::new(&server.url(), "secret", 1_000).unwrap();
        assert!(client.get_json("/api/tasks").await.unwrap().is_array());
    }

    #[tokio::test]
    async fn test_no_auth_header_without_key() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/tasks")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = HttpClient::new(&format!("{}/", server.url()), " ", 1_000).unwrap();
        client.get_json("/api/tasks").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("DELETE", "/api/tasks/t1")
            .with_status(204)
            .create_async()
            .await;

        let client = HttpClient::new(&server.url(), "", 1_000).unwrap();
        assert_eq!(client.delete("/api/tasks/t1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/tasks")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let client = HttpClient::new(&server.url(), "", 1_000).unwrap();
        let err = client.get_json("/api/tasks").await.unwrap_err();
        assert_eq!(err.kind(), HttpErrorKind::Decode);
        assert_eq!(err.status(), Some(200));
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport() {
        // Port 9 (discard) is almost never listening on loopback.
        let client = HttpClient::new("http://127.0.0.1:9", "", 1_000).unwrap();
        let err = client.get_json("/api/tasks").await.unwrap_err();
        assert!(matches!(
            err.kind(),
            HttpErrorKind::Connect
                | HttpErrorKind::Timeout
                | HttpErrorKind::Request
                | HttpErrorKind::Unknown
        ));
    }
}
