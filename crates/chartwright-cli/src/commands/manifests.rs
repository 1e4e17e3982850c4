//! Manifests command - split a rendered manifest by template

use chartwright_core::RedactionSet;
use chartwright_manifest::hooks::hooks_from_manifest;
use chartwright_manifest::{to_resources_json, Crd, RenderOutput, SplitOptions};
use console::style;
use miette::{IntoDiagnostic, WrapErr};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::ValueArgs;
use crate::error::{CliError, Result};

pub struct ManifestsArgs {
    pub input: PathBuf,
    pub show_only: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
    pub hooks: Option<PathBuf>,
    pub crds: Vec<PathBuf>,
    pub chart_name: String,
    pub no_hooks: bool,
    pub skip_tests: bool,
    pub sources: ValueArgs,
}

pub fn run(args: &ManifestsArgs) -> Result<()> {
    let config = args.sources.config()?;
    let options = SplitOptions {
        disable_hooks: args.no_hooks || config.split.disable_hooks,
        skip_tests: args.skip_tests || config.split.skip_tests,
        include_crds: !args.crds.is_empty() || config.split.include_crds,
        show_only: config
            .split
            .show_only
            .iter()
            .chain(&args.show_only)
            .cloned()
            .collect(),
    };

    // Only the sensitive overrides matter here, but a bad override still fails
    let redactions = args.sources.sources(config)?.compose()?.redactions;

    let hooks = match &args.hooks {
        Some(path) => hooks_from_manifest(&read_file(path)?),
        None => Vec::new(),
    };
    let crds = args
        .crds
        .iter()
        .map(|path| load_crd(&args.chart_name, path))
        .collect::<Result<Vec<_>>>()?;

    let rendered = RenderOutput::new(read_input(&args.input)?)
        .with_hooks(hooks)
        .with_crds(crds)
        .split(&options)?;

    debug!(
        documents = rendered.documents().len(),
        templates = rendered.manifests.len(),
        "split manifests"
    );

    if args.json {
        let json = to_resources_json(rendered.documents())?;
        println!("{}", redactions.fingerprint(&json));
        return Ok(());
    }

    match &args.output_dir {
        Some(dir) => write_templates(dir, &rendered.manifests, &redactions),
        None => {
            print!("{}", redactions.fingerprint(&rendered.bundle));
            Ok(())
        }
    }
}

fn write_templates(
    dir: &Path,
    manifests: &BTreeMap<String, String>,
    redactions: &RedactionSet,
) -> Result<()> {
    let files = manifests
        .iter()
        .map(|(template, content)| Ok((dir.join(template_file(template)?), content)))
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to create output directory: {}", dir.display()))?;

    for (file_path, content) in files {
        // Create parent directories if needed
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).into_diagnostic()?;
        }

        fs::write(&file_path, redactions.fingerprint(content))
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to write {}", file_path.display()))?;

        println!("{} {}", style("wrote").green(), file_path.display());
    }

    Ok(())
}

/// Relative file path for a template; paths escaping the output directory are refused
fn template_file(template: &str) -> Result<&Path> {
    let path = Path::new(template);
    let contained = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(CliError::usage_with_help(
            format!("template path '{template}' escapes the output directory"),
            "Template paths must be relative and must not contain '..'",
        ));
    }
    Ok(path)
}

fn load_crd(chart_name: &str, path: &Path) -> Result<Crd> {
    let name = path.file_name().ok_or_else(|| {
        CliError::usage_with_help(
            format!("invalid CRD path '{}'", path.display()),
            "Pass a file, not a directory",
        )
    })?;
    let filename = format!("{}/crds/{}", chart_name, name.to_string_lossy());
    Ok(Crd::new(filename, read_file(path)?.trim_end()))
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    read_file(path)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| CliError::Io {
        message: format!("{}: {}", path.display(), e),
    })
}
