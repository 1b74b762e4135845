//! The HTTP location driver: talks to a remote outpack server over a small
//! JSON/binary contract (`spec.md` §4.i). The wire format itself is out of
//! scope; this implements just enough of it to exercise the
//! [`LocationDriver`] trait the same way [`PathDriver`](crate::PathDriver)
//! does.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use outpack_hash::Hash;
use outpack_metadata::{PacketId, PacketLocation};
use reqwest::Client;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use tracing::debug;
use url::Url;

use crate::{DriverError, LocationDriver};

/// A connection to a remote outpack location over HTTP(S).
pub struct HttpDriver {
    base: Url,
    client: ClientWithMiddleware,
}

impl HttpDriver {
    pub fn new(base: Url) -> Self {
        Self::with_retries(base, 3)
    }

    pub fn with_retries(base: Url, retries: u32) -> Self {
        let raw = Client::builder()
            .user_agent("outpack-rs")
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(5 * 60))
            .build()
            .expect("failed to build HTTP client");

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(retries);
        let client = reqwest_middleware::ClientBuilder::new(raw)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self { base, client }
    }

    fn url(&self, path: &str) -> Url {
        self.base.join(path).expect("invalid location path join")
    }
}

#[async_trait]
impl LocationDriver for HttpDriver {
    async fn list_packets(&self) -> Result<BTreeMap<PacketId, PacketLocation>, DriverError> {
        debug!(url = %self.base, "listing packets from remote location");
        let resp = self.client.get(self.url("metadata/list")).send().await?;
        Ok(resp.json().await.map_err(reqwest_middleware::Error::Reqwest)?)
    }

    async fn metadata(
        &self,
        ids: &[PacketId],
    ) -> Result<BTreeMap<PacketId, String>, DriverError> {
        let mut out = BTreeMap::new();
        for id in ids {
            let resp = self
                .client
                .get(self.url(&format!("metadata/{id}/json")))
                .send()
                .await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(DriverError::UnknownPacket(id.clone()));
            }
            let text = resp.text().await.map_err(reqwest_middleware::Error::Reqwest)?;
            out.insert(id.clone(), text);
        }
        Ok(out)
    }

    async fn fetch_file(
        &self,
        _packet: &PacketId,
        hash: &Hash,
        dest: &Path,
    ) -> Result<(), DriverError> {
        let resp = self.client.get(self.url(&format!("file/{hash}"))).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DriverError::FileNotFound(hash.clone()));
        }
        let bytes = resp.bytes().await.map_err(reqwest_middleware::Error::Reqwest)?;
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::write(dest, bytes)?;
        Ok(())
    }

    async fn list_unknown_packets(&self, ids: &[PacketId]) -> Result<Vec<PacketId>, DriverError> {
        let known = self.list_packets().await?;
        Ok(ids.iter().filter(|id| !known.contains_key(id)).cloned().collect())
    }

    async fn list_unknown_files(&self, hashes: &[Hash]) -> Result<Vec<Hash>, DriverError> {
        let body = serde_json::to_string(hashes)?;
        let resp = self
            .client
            .post(self.url("file/exists"))
            .body(body)
            .header("content-type", "application/json")
            .send()
            .await?;
        let present: Vec<Hash> = resp.json().await.map_err(reqwest_middleware::Error::Reqwest)?;
        Ok(hashes.iter().filter(|h| !present.contains(h)).cloned().collect())
    }

    async fn push_file(&self, src: &Path, hash: &Hash) -> Result<(), DriverError> {
        let bytes = fs_err::read(src)?;
        self.client
            .post(self.url(&format!("file/{hash}")))
            .body(bytes)
            .send()
            .await?;
        Ok(())
    }

    async fn push_metadata(&self, src: &Path, hash: &Hash) -> Result<(), DriverError> {
        let bytes = fs_err::read(src)?;
        self.client
            .post(self.url(&format!("metadata/{hash}")))
            .body(bytes)
            .send()
            .await?;
        Ok(())
    }
}
