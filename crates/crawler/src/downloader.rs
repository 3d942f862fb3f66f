//! The collaborator interface: a page fetcher, and the default blocking
//! `reqwest`-backed implementation used by the CLI. Out of scope for the
//! domain proper (§1) — this module exists only so the pipeline has
//! something real to drive.

use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub addr: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// A capability that fetches a page body given a URL. Implementations may
/// block; the crawl pipeline supplies its own concurrency around a pool of
/// these.
pub trait WebPageDownloader: Send {
    fn set_proxy(&mut self, settings: &ProxySettings) -> Result<()>;
    fn download_page(&mut self, url: &str) -> Result<String>;
}

/// Produces owned downloader handles for the pipeline's pool.
pub trait WebPageDownloaderFactory: Send + Sync {
    fn create(&self) -> Box<dyn WebPageDownloader>;
}

const MAX_CONTENT_LENGTH_BYTES: u64 = 16 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A blocking downloader backed by [`reqwest::blocking::Client`]. Follows
/// redirects per `reqwest`'s default policy, bounds response size, and
/// treats the body as UTF-8 on a best-effort (lossy) basis — body encoding
/// detection is out of scope.
pub struct BlockingHttpDownloader {
    client: reqwest::blocking::Client,
}

impl BlockingHttpDownloader {
    pub fn new() -> Self {
        Self {
            client: Self::build_client(None),
        }
    }

    fn build_client(proxy: Option<&ProxySettings>) -> reqwest::blocking::Client {
        let mut builder = reqwest::blocking::Client::builder().timeout(REQUEST_TIMEOUT);

        if let Some(settings) = proxy {
            let proxy_url = format!("http://{}:{}", settings.addr, settings.port);
            if let Ok(mut proxy) = reqwest::Proxy::all(&proxy_url) {
                if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
                    proxy = proxy.basic_auth(user, password);
                }
                builder = builder.proxy(proxy);
            }
        }

        builder.build().unwrap_or_default()
    }
}

impl Default for BlockingHttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl WebPageDownloader for BlockingHttpDownloader {
    fn set_proxy(&mut self, settings: &ProxySettings) -> Result<()> {
        self.client = Self::build_client(Some(settings));
        Ok(())
    }

    fn download_page(&mut self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::Network {
                url: url.to_string(),
                source: e.into(),
            })?;

        let response = response.error_for_status().map_err(|e| Error::Network {
            url: url.to_string(),
            source: e.into(),
        })?;

        let bytes = response.bytes().map_err(|e| Error::Network {
            url: url.to_string(),
            source: e.into(),
        })?;

        if bytes.len() as u64 > MAX_CONTENT_LENGTH_BYTES {
            return Err(Error::Network {
                url: url.to_string(),
                source: anyhow::anyhow!("response body exceeds {MAX_CONTENT_LENGTH_BYTES} bytes"),
            });
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub struct BlockingHttpDownloaderFactory;

impl WebPageDownloaderFactory for BlockingHttpDownloaderFactory {
    fn create(&self) -> Box<dyn WebPageDownloader> {
        Box::new(BlockingHttpDownloader::new())
    }
}
