//! Gatehouse is a host and path routing reverse proxy.
//!
//! Requests are matched against a routing table compiled from records kept
//! in SQLite. A match either forwards to a backend, serves a static body,
//! or answers with a redirect. Operators change the records through an
//! authenticated admin API and the table is rebuilt in the background
//! without blocking live traffic.
//!
//! # Architecture
//!
//! - [`compile`] -- Snapshot publication, the debounced rebuild
//!   [`Coalescer`](compile::Coalescer) and the [`Compilable`](compile::Compilable)
//!   provider contract.
//! - [`router`] -- Path patterns, route and redirect records, and the
//!   [`RouterManager`](router::RouterManager) that compiles them into the
//!   host-and-path dispatch table.
//! - [`providers`] -- Domain allow-list, TLS certificates, favicons and
//!   error pages, each rebuilt through its own coalescer.
//! - [`storage`] -- The [`Storage`](storage::Storage) trait and its SQLite
//!   implementation.
//! - [`proxy`] -- The public gateway handler: ACME challenges, favicons,
//!   dispatch and request forwarding.
//! - [`api`] -- The administrative API and its bearer-token extractor.
//! - [`auth`] -- JWT verification and permission claims.
//! - [`acme`] -- In-memory ACME HTTP-01 challenge store.
//! - [`server`] -- Application state, the two axum routers, the shared HTTP
//!   client, and graceful shutdown.
//! - [`cli`] / [`cmd`] -- Command-line parsing and the serve, validate and
//!   health subcommands.
//! - [`config`] -- Startup config file loading and validation.
//! - [`domain`] -- Host name helpers (ports, wildcard forms, top FQDN).
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |

// Public items serve the gatehouse binary and its tests; error docs are omitted.
#![allow(clippy::missing_errors_doc)]

pub mod acme;
pub mod api;
pub mod auth;
pub mod cli;
pub mod cmd;
pub mod compile;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod logging;
pub mod providers;
pub mod proxy;
pub mod router;
pub mod server;
pub mod storage;
