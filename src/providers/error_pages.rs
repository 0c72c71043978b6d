//! Custom HTML error pages, keyed by status code.
//!
//! Pages are read from `<dir>/<code>.html`. Without a directory, or for a
//! code without a file, the generic `"<code> <reason>"` plain-text body is
//! used.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::compile::{Coalescer, Compilable, Snapshot};
use crate::error::GatehouseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl ErrorPage {
    /// `"<code> <reason>"`, e.g. `"404 Not Found"`.
    #[must_use]
    pub fn generic(status: StatusCode) -> Self {
        let text = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status")
        );
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: Bytes::from(text),
        }
    }
}

impl IntoResponse for ErrorPage {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

async fn load_pages(dir: &std::path::Path) -> Result<HashMap<u16, Bytes>, GatehouseError> {
    let mut pages = HashMap::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(code) = file_name
            .to_str()
            .and_then(|name| name.strip_suffix(".html"))
            .and_then(|stem| stem.parse::<u16>().ok())
            .filter(|code| StatusCode::from_u16(*code).is_ok())
        else {
            continue;
        };
        let body = tokio::fs::read(entry.path()).await?;
        pages.insert(code, Bytes::from(body));
    }
    Ok(pages)
}

struct Shared {
    dir: Option<PathBuf>,
    pages: Snapshot<HashMap<u16, Bytes>>,
}

#[derive(Clone)]
pub struct ErrorPageProvider {
    shared: Arc<Shared>,
    coalescer: Coalescer,
}

impl ErrorPageProvider {
    pub fn new(dir: Option<PathBuf>) -> Self {
        let shared = Arc::new(Shared {
            dir,
            pages: Snapshot::default(),
        });
        let for_rebuild = Arc::clone(&shared);
        let coalescer = Coalescer::new("error_pages", move || {
            let shared = Arc::clone(&for_rebuild);
            async move {
                let pages = match &shared.dir {
                    Some(dir) => load_pages(dir).await?,
                    None => HashMap::new(),
                };
                tracing::info!(pages = pages.len(), "error pages compiled");
                shared.pages.publish(pages).await;
                Ok(())
            }
        });
        Self { shared, coalescer }
    }

    pub async fn page(&self, status: StatusCode) -> ErrorPage {
        let pages = self.shared.pages.load().await;
        match pages.get(&status.as_u16()) {
            Some(body) => ErrorPage {
                status,
                content_type: "text/html; charset=utf-8",
                body: body.clone(),
            },
            None => ErrorPage::generic(status),
        }
    }
}

impl Compilable for ErrorPageProvider {
    fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }
}
