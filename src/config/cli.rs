use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the catalog-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "catalog-cache",
    version,
    about = "Product catalog cache engine"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CATALOG_CACHE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the cache key generated for a prefix and parameter set.
    Key(KeyArgs),
    /// Replay a fixture of mutation events against a seeded cache.
    Replay(ReplayArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Enable or disable the cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,

    /// Override the default entry lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS", global = true)]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the backend key namespace.
    #[arg(long = "cache-key-prefix", value_name = "PREFIX", global = true)]
    pub cache_key_prefix: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    /// Key prefix, e.g. `products`.
    #[arg(value_name = "PREFIX")]
    pub prefix: String,

    /// Request parameter as `name=value`; values parse as JSON, else as strings.
    #[arg(
        long = "param",
        short = 'p',
        value_name = "NAME=VALUE",
        value_parser = parse_param
    )]
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Args, Clone)]
pub struct ReplayArgs {
    /// TOML fixture with products, seeded entries and events.
    #[arg(value_name = "FIXTURE", value_hint = ValueHint::FilePath)]
    pub fixture: PathBuf,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in `{raw}`"));
    }
    Ok((name.to_string(), value.to_string()))
}
