//! Signed REST transport for Bybit v5.
//!
//! Private endpoints are authenticated with HMAC-SHA256 over
//! `timestamp + api_key + recv_window + payload`, where the payload is the
//! raw query string for GET and the JSON body for POST.

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

use super::types::Envelope;
use crate::error::{VenueError, VenueResult};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &str) -> VenueResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| VenueError::Http(format!("invalid api secret: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Join query parameters in the given order; the signature covers this exact string.
pub fn query_string(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub struct RestClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        recv_window_ms: u64,
        timeout: Duration,
    ) -> VenueResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VenueError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            recv_window_ms,
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    fn auth_headers(&self, payload: &str) -> VenueResult<Vec<(&'static str, String)>> {
        if !self.has_credentials() {
            return Err(VenueError::Unsupported(
                "private endpoint requires api credentials".to_string(),
            ));
        }
        let timestamp = Utc::now().timestamp_millis().to_string();
        let recv_window = self.recv_window_ms.to_string();
        let signature = sign(
            &self.api_secret,
            &format!("{timestamp}{}{recv_window}{payload}", self.api_key),
        )?;
        Ok(vec![
            ("X-BAPI-API-KEY", self.api_key.clone()),
            ("X-BAPI-TIMESTAMP", timestamp),
            ("X-BAPI-RECV-WINDOW", recv_window),
            ("X-BAPI-SIGN", signature),
        ])
    }

    /// GET returning the raw envelope.
    pub async fn get_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> VenueResult<Envelope<T>> {
        let query = query_string(params);
        let url = format!("{}{path}?{query}", self.base_url);
        let mut request = self.client.get(&url);
        if signed {
            for (name, value) in self.auth_headers(&query)? {
                request = request.header(name, value);
            }
        }
        debug!(%path, "Bybit GET");
        let response = request.send().await?;
        Self::decode(response).await
    }

    /// POST returning the raw envelope.
    pub async fn post_envelope<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> VenueResult<Envelope<T>> {
        let payload = serde_json::to_string(body)?;
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in self.auth_headers(&payload)? {
            request = request.header(name, value);
        }
        debug!(%path, "Bybit POST");
        let response = request.body(payload).send().await?;
        Self::decode(response).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> VenueResult<T> {
        into_result(self.get_envelope(path, params, signed).await?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> VenueResult<T> {
        into_result(self.post_envelope(path, body).await?)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> VenueResult<Envelope<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::Http(format!("HTTP {status}: {body}")));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Unwrap a successful envelope.
pub fn into_result<T>(envelope: Envelope<T>) -> VenueResult<T> {
    if envelope.ret_code != 0 {
        return Err(VenueError::Api {
            code: envelope.ret_code,
            msg: envelope.ret_msg,
        });
    }
    envelope
        .result
        .ok_or_else(|| VenueError::Decode("missing result".to_string()))
}
