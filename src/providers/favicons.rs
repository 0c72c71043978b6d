//! Per-host favicons, downloaded and fingerprinted at rebuild time.
//!
//! Storage rows hold source URLs for the SVG, PNG and ICO variants. A
//! rebuild downloads every listed URL, converts the SVG into a PNG when no
//! PNG source is given, and stores each image with its SHA-256 digest,
//! which the gateway serves as the `ETag`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::try_join_all;
use http_body_util::{BodyExt, Full};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::compile::{Coalescer, Compilable, Snapshot};
use crate::error::GatehouseError;
use crate::server::HttpClient;
use crate::storage::{FaviconRecord, Storage};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const CONVERT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Svg,
    Png,
    Ico,
}

impl IconFormat {
    /// Map a request path to the icon it asks for.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/favicon.svg" => Some(Self::Svg),
            "/favicon.png" => Some(Self::Png),
            "/favicon.ico" => Some(Self::Ico),
            _ => None,
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
            Self::Ico => "image/x-icon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaviconImage {
    /// Source URL; `None` for images produced by conversion.
    pub url: Option<String>,
    pub hash: String,
    pub raw: Bytes,
}

impl FaviconImage {
    fn new(url: Option<String>, raw: Bytes) -> Self {
        let hash = format!("{:x}", Sha256::digest(&raw));
        Self { url, hash, raw }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaviconList {
    pub svg: Option<FaviconImage>,
    pub png: Option<FaviconImage>,
    pub ico: Option<FaviconImage>,
}

impl FaviconList {
    #[must_use]
    pub fn get(&self, format: IconFormat) -> Option<&FaviconImage> {
        match format {
            IconFormat::Svg => self.svg.as_ref(),
            IconFormat::Png => self.png.as_ref(),
            IconFormat::Ico => self.ico.as_ref(),
        }
    }
}

/// Downloads icon sources.
#[async_trait]
pub trait IconFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, GatehouseError>;
}

/// Rasterises SVG icons.
#[async_trait]
pub trait SvgConverter: Send + Sync {
    async fn svg_to_png(&self, svg: &[u8]) -> Result<Bytes, GatehouseError>;
}

/// [`IconFetcher`] over the gateway's shared HTTP client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: HttpClient,
}

impl HttpFetcher {
    #[must_use]
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IconFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, GatehouseError> {
        let fetch_err = |message: String| GatehouseError::Fetch {
            url: url.to_string(),
            message,
        };
        let uri: hyper::Uri = url.parse().map_err(|e| fetch_err(format!("{e}")))?;
        let req = hyper::Request::get(uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| fetch_err(e.to_string()))?;

        let response = tokio::time::timeout(FETCH_TIMEOUT, self.client.request(req))
            .await
            .map_err(|_| fetch_err(format!("timed out after {}s", FETCH_TIMEOUT.as_secs())))?
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("unexpected status {status}")));
        }
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| fetch_err(format!("body read error: {e}")))?;
        Ok(body.to_bytes())
    }
}

/// Converts through an Inkscape-compatible command reading SVG on stdin
/// and writing PNG on stdout.
#[derive(Debug, Clone)]
pub struct InkscapeConverter {
    command: String,
    timeout: Duration,
}

impl InkscapeConverter {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_timeout(command, CONVERT_TIMEOUT)
    }

    /// A converter that kills the command once `timeout` elapses.
    #[must_use]
    pub fn with_timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SvgConverter for InkscapeConverter {
    async fn svg_to_png(&self, svg: &[u8]) -> Result<Bytes, GatehouseError> {
        let mut child = tokio::process::Command::new(&self.command)
            .args(["--export-type=png", "--export-filename=-", "--pipe"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatehouseError::Transcode(format!("failed to start {}: {e}", self.command)))?;

        // Feed stdin while stdout is drained, or a converter that streams
        // output before reading all input fills both pipes and stalls.
        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(svg).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let run = async { tokio::join!(write, child.wait_with_output()) };

        // Dropping the timed-out future drops the child, which kills it.
        let (written, output) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                GatehouseError::Transcode(format!(
                    "{} timed out after {}ms",
                    self.command,
                    self.timeout.as_millis()
                ))
            })?;
        let output = output?;
        if !output.status.success() {
            return Err(GatehouseError::Transcode(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        written?;
        if output.stdout.is_empty() {
            return Err(GatehouseError::Transcode("converter produced no output".into()));
        }
        Ok(Bytes::from(output.stdout))
    }
}

struct Shared {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn IconFetcher>,
    converter: Arc<dyn SvgConverter>,
    icons: Snapshot<HashMap<String, Arc<FaviconList>>>,
}

fn source(url: Option<&String>) -> Option<&str> {
    url.map(String::as_str).filter(|u| !u.is_empty())
}

impl Shared {
    async fn fetch_image(&self, url: Option<&String>) -> Result<Option<FaviconImage>, GatehouseError> {
        match source(url) {
            Some(url) => {
                let raw = self.fetcher.fetch(url).await?;
                Ok(Some(FaviconImage::new(Some(url.to_string()), raw)))
            }
            None => Ok(None),
        }
    }

    async fn build_list(&self, record: &FaviconRecord) -> Result<FaviconList, GatehouseError> {
        let (svg, png, ico) = futures_util::try_join!(
            self.fetch_image(record.svg.as_ref()),
            self.fetch_image(record.png.as_ref()),
            self.fetch_image(record.ico.as_ref()),
        )?;

        let png = match (png, &svg) {
            (Some(png), _) => Some(png),
            (None, Some(svg)) => {
                let raw = self.converter.svg_to_png(&svg.raw).await?;
                Some(FaviconImage::new(None, raw))
            }
            (None, None) => None,
        };

        Ok(FaviconList { svg, png, ico })
    }

    async fn rebuild(&self) -> Result<(), GatehouseError> {
        let records = self.storage.list_favicons().await?;
        let lists = try_join_all(records.iter().map(|record| async move {
            let list = self.build_list(record).await?;
            Ok::<_, GatehouseError>((record.host.clone(), Arc::new(list)))
        }))
        .await?;

        let icons: HashMap<_, _> = lists.into_iter().collect();
        tracing::info!(hosts = icons.len(), "favicons compiled");
        self.icons.publish(icons).await;
        Ok(())
    }
}

#[derive(Clone)]
pub struct FaviconProvider {
    shared: Arc<Shared>,
    coalescer: Coalescer,
}

impl FaviconProvider {
    pub fn new(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn IconFetcher>,
        converter: Arc<dyn SvgConverter>,
    ) -> Self {
        let shared = Arc::new(Shared {
            storage,
            fetcher,
            converter,
            icons: Snapshot::default(),
        });
        let for_rebuild = Arc::clone(&shared);
        let coalescer = Coalescer::new("favicons", move || {
            let shared = Arc::clone(&for_rebuild);
            async move { shared.rebuild().await }
        });
        Self { shared, coalescer }
    }

    /// Icons for an exact host, if any were configured.
    pub async fn get_icons(&self, host: &str) -> Option<Arc<FaviconList>> {
        self.shared.icons.load().await.get(host).cloned()
    }

    pub async fn put(&self, record: &FaviconRecord) -> Result<(), GatehouseError> {
        self.shared.storage.put_favicon(record).await?;
        self.compile();
        Ok(())
    }
}

impl Compilable for FaviconProvider {
    fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }
}
