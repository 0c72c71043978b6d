//! Compilable providers other than the routing table.
//!
//! Each one reads its source (storage or a directory) on rebuild, builds a
//! complete snapshot and publishes it; see [`crate::compile`].

pub mod certs;
pub mod domains;
pub mod error_pages;
pub mod favicons;

pub use certs::{CertDirs, CertificateProvider};
pub use domains::DomainProvider;
pub use error_pages::{ErrorPage, ErrorPageProvider};
pub use favicons::{
    FaviconList, FaviconProvider, HttpFetcher, IconFetcher, IconFormat, InkscapeConverter,
    SvgConverter,
};
