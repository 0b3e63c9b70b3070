//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, render, init, health), and their argument structs.
//! Every `run` and `render` flag has a `CONSUL_INGRESS_*` environment
//! variable equivalent for container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "consul-ingress",
    version,
    about = "Run Caddy as an ingress controller for a Consul / Nomad cluster",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        consul-ingress run                                  Watch Consul on localhost:8500\n  \
        consul-ingress render                               Print the Caddyfile once\n  \
        consul-ingress init -o route.tmpl                   Write the built-in template"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch Consul and keep Caddy configured
    Run(Box<RunArgs>),

    /// Render the Caddyfile once from the current registry state
    Render(Box<RenderArgs>),

    /// Write the built-in route template to a file
    Init(InitArgs),

    /// Query the status endpoint of a running instance
    Health(HealthArgs),
}

/// Registry discovery and rendering options shared by `run` and `render`.
#[derive(Args, Clone, Debug)]
pub struct DiscoveryArgs {
    /// Address of the Consul agent
    #[arg(
        long,
        env = "CONSUL_INGRESS_CONSUL_ADDRESS",
        default_value = "http://localhost:8500",
        help_heading = "Consul"
    )]
    pub consul_address: String,

    /// Access token for Consul
    #[arg(
        long,
        env = "CONSUL_INGRESS_CONSUL_TOKEN",
        default_value = "",
        hide_env_values = true,
        help_heading = "Consul"
    )]
    pub consul_token: String,

    /// Consul DNS domain used for dynamic SRV upstreams
    #[arg(
        long,
        env = "CONSUL_INGRESS_REGISTRY_DOMAIN",
        default_value = "consul",
        help_heading = "Consul"
    )]
    pub registry_domain: String,

    /// Prefix for the tags defining service URLs
    #[arg(
        long = "urlprefix",
        env = "CONSUL_INGRESS_URLPREFIX",
        default_value = "urlprefix-",
        help_heading = "Consul"
    )]
    pub url_prefix: String,

    /// Path to the Consul KV store for custom routes (empty disables)
    #[arg(
        long = "kvpath",
        env = "CONSUL_INGRESS_KV_PATH",
        default_value = "/caddy-routes",
        help_heading = "Consul"
    )]
    pub kv_path: String,

    /// Space separated list of wildcard domains to group services by
    #[arg(
        long,
        env = "CONSUL_INGRESS_WILDCARD_DOMAINS",
        value_delimiter = ' ',
        help_heading = "Rendering"
    )]
    pub wildcard_domains: Vec<String>,

    /// Template rendered once per route and wildcard group (built-in if unset)
    #[arg(
        short,
        long,
        env = "CONSUL_INGRESS_TEMPLATE",
        help_heading = "Rendering"
    )]
    pub template: Option<PathBuf>,

    /// Base Caddyfile placed before the generated routes
    #[arg(long, env = "CONSUL_INGRESS_CADDYFILE", help_heading = "Rendering")]
    pub caddyfile: Option<PathBuf>,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        consul-ingress run --wildcard-domains '*.example.com'     Group *.example.com hosts\n  \
        consul-ingress run --kvpath '' --restart                   Catalog only, full restarts\n  \
        consul-ingress run --status-addr 127.0.0.1:2020 --pretty   Local dev mode")]
pub struct RunArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Seconds Consul may hold a blocking query open
    #[arg(
        long,
        env = "CONSUL_INGRESS_POLLING_INTERVAL",
        default_value_t = 30,
        help_heading = "Consul"
    )]
    pub polling_interval: u64,

    // -- Caddy --
    /// Address of the Caddy admin API
    #[arg(
        long,
        env = "CONSUL_INGRESS_ADMIN_ADDRESS",
        default_value = "http://localhost:2019",
        help_heading = "Caddy"
    )]
    pub admin_address: String,

    /// Translate the Caddyfile via /adapt and load the resulting JSON
    #[arg(long, env = "CONSUL_INGRESS_ADAPT", help_heading = "Caddy")]
    pub adapt: bool,

    /// Stop all Caddy apps and listeners before loading each new configuration.
    /// The admin API is kept on --admin-address, so a base Caddyfile must not
    /// move it elsewhere with the `admin` global option.
    #[arg(long, env = "CONSUL_INGRESS_RESTART", help_heading = "Caddy")]
    pub restart: bool,

    /// Where to save each generated Caddyfile (default: <config dir>/caddy/Caddyfile.autosave)
    #[arg(long, env = "CONSUL_INGRESS_AUTOSAVE", help_heading = "Caddy")]
    pub autosave: Option<PathBuf>,

    /// Serve GET /health on this address
    #[arg(long, env = "CONSUL_INGRESS_STATUS_ADDR")]
    pub status_addr: Option<String>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Set the log level to debug and log every rendered Caddyfile
    #[arg(short, long, env = "CONSUL_INGRESS_VERBOSE")]
    pub verbose: bool,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,
}

#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Write the document to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "route.tmpl")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance's status endpoint
    #[arg(default_value = "http://localhost:2020")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}
