//! CLI commands

pub mod manifests;
pub mod values;

use chartwright_core::{SetListValue, SetValue, TypeHint, ValueSources, Values};
use chartwright_manifest::SplitOptions;
use clap::Args;
use miette::{IntoDiagnostic, WrapErr};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CliError, Result};

/// Value sources shared by every command
#[derive(Args, Debug, Default)]
pub struct ValueArgs {
    /// Release configuration file (values, set, setSensitive, setList, split)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Values file(s) to merge
    #[arg(short = 'f', long = "values")]
    pub values: Vec<PathBuf>,

    /// Set values on command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Set string values on command line (key=value)
    #[arg(long = "set-string")]
    pub set_string: Vec<String>,

    /// Set sensitive values on command line (key=value), hidden in output
    #[arg(long = "set-sensitive")]
    pub set_sensitive: Vec<String>,

    /// Set a list on command line (key=a,b,c)
    #[arg(long = "set-list")]
    pub set_list: Vec<String>,
}

/// Release configuration file
#[derive(Debug, Default, Deserialize)]
pub struct ReleaseConfig {
    #[serde(flatten)]
    pub sources: ValueSources,

    #[serde(default)]
    pub split: SplitOptions,
}

impl ReleaseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }
}

impl ValueArgs {
    /// Configuration file contents, or defaults without `--config`
    pub fn config(&self) -> Result<ReleaseConfig> {
        match &self.config {
            Some(path) => ReleaseConfig::load(path),
            None => Ok(ReleaseConfig::default()),
        }
    }

    /// Layer command line flags on top of the configured sources
    pub fn sources(&self, config: ReleaseConfig) -> Result<ValueSources> {
        let mut sources = config.sources;
        let mut flags = ValueSources::new();

        for file in &self.values {
            let values = Values::from_file(file)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to load values file: {}", file.display()))?;
            flags = flags.with_values(values);
            debug!(file = %file.display(), "loaded values file");
        }

        for arg in &self.set {
            flags = flags.with_set(parse_set("--set", arg, TypeHint::Auto)?);
        }
        for arg in &self.set_string {
            flags = flags.with_set(parse_set("--set-string", arg, TypeHint::String)?);
        }
        for arg in &self.set_sensitive {
            flags = flags.with_sensitive(parse_set("--set-sensitive", arg, TypeHint::Auto)?);
        }
        for arg in &self.set_list {
            let (name, items) = arg.split_once('=').ok_or_else(|| {
                CliError::usage_with_help(
                    format!("invalid --set-list argument '{}'", arg),
                    "Expected key=item1,item2",
                )
            })?;
            flags = flags.with_list(SetListValue::new(name, items.split(',')));
        }

        sources.extend(flags);
        Ok(sources)
    }
}

fn parse_set(flag: &str, arg: &str, hint: TypeHint) -> Result<SetValue> {
    SetValue::parse_arg(arg, hint).ok_or_else(|| {
        // Sensitive arguments never reach the message
        let shown = if flag == "--set-sensitive" { "(sensitive value)" } else { arg };
        CliError::usage_with_help(
            format!("invalid {} argument '{}'", flag, shown),
            "Expected key=value",
        )
    })
}
