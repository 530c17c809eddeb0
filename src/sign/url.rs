use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::AppInfo;

use super::{SignResult, Signer};

/// Signer backed by an HTTP signing server.
pub struct UrlSigner {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    cmd: &'a str,
    seq: i32,
    src: String,
}

#[derive(Deserialize)]
struct SignResponse {
    #[allow(dead_code)]
    platform: String,
    #[allow(dead_code)]
    version: String,
    value: SignValue,
}

#[derive(Deserialize)]
struct SignValue {
    sign: String,
    token: String,
    extra: String,
}

impl UrlSigner {
    pub fn new(url: &str, http_proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(proxy) = http_proxy.filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::http(proxy).context("Invalid sign proxy")?);
        }
        Ok(Self {
            http: builder.build()?,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the client profile the signing server was built for.
    pub async fn app_info(&self) -> Result<Option<AppInfo>> {
        let resp = self
            .http
            .get(format!("{}/appinfo", self.url))
            .send()
            .await?;
        if !resp.status().is_success() {
            debug!("Sign server has no app info (status {})", resp.status());
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }
}

#[async_trait]
impl Signer for UrlSigner {
    async fn sign(
        &self,
        command: &str,
        sequence: i32,
        payload: &[u8],
    ) -> Result<Option<SignResult>> {
        debug!("[seq={sequence}] Requesting sign for {command}");
        let resp = self
            .http
            .post(&self.url)
            .json(&SignRequest {
                cmd: command,
                seq: sequence,
                src: hex::encode(payload),
            })
            .send()
            .await
            .context("Sign request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Sign server error {}", resp.status());
        }

        let body: SignResponse = resp.json().await.context("Bad sign response")?;
        Ok(Some(SignResult {
            sign: hex::decode(&body.value.sign).context("sign is not hex")?,
            token: hex::decode(&body.value.token).context("token is not hex")?,
            extra: hex::decode(&body.value.extra).context("extra is not hex")?,
        }))
    }
}
