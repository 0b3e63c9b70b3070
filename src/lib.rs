//! consul-ingress runs Caddy as an ingress controller for a Consul cluster.
//!
//! It long-polls the Consul catalog (and optionally a KV prefix), derives
//! HTTP routes from service tags and KV route lines, groups hostnames
//! under configured wildcard domains, renders a Caddyfile, and pushes it
//! to Caddy's admin API only when its content actually changed.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, render, init, health).
//! - [`config`] -- Startup validation of discovery settings.
//! - [`routes`] -- Route data model, tag grammar, and wildcard aggregation.
//! - [`registry`] -- Consul client and the long-poll watchers.
//! - [`render`] -- Template-driven Caddyfile rendering.
//! - [`apply`] -- Content hashing, autosave, and the Caddy admin API
//!   behind the [`ControlPlane`](apply::ControlPlane) trait.
//! - [`pipeline`] -- The single task that renders and applies snapshots.
//! - [`error`] -- Unified error type using `thiserror`.
//! - [`health`] -- `GET /health` status handler.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`server`] -- Shared state, HTTP client, status router, and shutdown.

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod apply;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod routes;
pub mod server;
