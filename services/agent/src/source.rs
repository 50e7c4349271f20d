//! Desired-state document source.
//!
//! The document is read from a local file or fetched over HTTP(S) on every
//! load; nothing is cached between loads.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use iot_model::DesiredState;
use tracing::{debug, error, info, warn};

const SCHEME_SEPARATOR: &str = "://";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Location of the desired-state document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocator {
    /// `file:///path/to/doc.json`
    File(PathBuf),

    /// `http://…` or `https://…`, fetched with a GET.
    Http(String),
}

impl ConfigLocator {
    /// Parse a locator by its scheme.
    pub fn parse(locator: &str) -> Result<Self> {
        let Some((scheme, rest)) = locator.split_once(SCHEME_SEPARATOR) else {
            bail!("{locator:?} has no scheme (expected file://, http:// or https://)");
        };

        match scheme.to_lowercase().as_str() {
            "file" => {
                if rest.is_empty() {
                    bail!("{locator:?} has no file path");
                }
                Ok(Self::File(PathBuf::from(rest)))
            }
            "http" | "https" => {
                if rest.is_empty() {
                    bail!("{locator:?} has no host");
                }
                Ok(Self::Http(locator.to_string()))
            }
            other => bail!("unsupported scheme {other:?} in {locator:?}"),
        }
    }
}

impl fmt::Display for ConfigLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLocator::File(path) => write!(f, "file://{}", path.display()),
            ConfigLocator::Http(url) => write!(f, "{url}"),
        }
    }
}

/// Reads the desired-state document from its locator.
pub struct ConfigSource {
    locator: ConfigLocator,
    client: reqwest::Client,
}

impl ConfigSource {
    pub fn new(locator: ConfigLocator) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { locator, client })
    }

    pub fn locator(&self) -> &ConfigLocator {
        &self.locator
    }

    /// Raw document bytes.
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        match &self.locator {
            ConfigLocator::File(path) => {
                debug!(path = %path.display(), "Reading configuration file");
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))
            }
            ConfigLocator::Http(url) => {
                debug!(url = %url, "Fetching configuration");
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Failed to fetch {url}"))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    error!(status = %status, body = %body, "Failed to fetch configuration");
                    bail!("Failed to fetch {url}: {status} - {body}");
                }

                let body = response
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read body of {url}"))?;
                Ok(body.to_vec())
            }
        }
    }

    /// Fetch, parse and validate the document.
    pub async fn load(&self) -> Result<DesiredState> {
        info!(source = %self.locator, "Loading configuration");

        let bytes = self.fetch().await?;
        let desired = DesiredState::from_slice(&bytes)
            .with_context(|| format!("Invalid configuration document at {}", self.locator))?;

        let summary = desired.summary();
        info!(
            volumes = summary.volumes,
            networks = summary.networks,
            containers = summary.containers,
            fingerprint = %desired.fingerprint(),
            "Configuration loaded"
        );
        if desired.is_empty() {
            warn!(source = %self.locator, "Configuration declares no resources");
        }

        Ok(desired)
    }
}
