//! Values command - compose release values and print them safely

use console::style;
use miette::{IntoDiagnostic, WrapErr};
use tracing::debug;

use super::ValueArgs;
use crate::error::Result;

pub fn run(args: &ValueArgs, json: bool) -> Result<()> {
    let config = args.config()?;
    let composed = args.sources(config)?.compose()?;
    let cloaked = composed.cloaked();

    debug!(
        sensitive = composed.redactions.paths().len(),
        "composed values"
    );

    if json {
        let output = serde_json::to_string_pretty(cloaked.inner())
            .into_diagnostic()
            .wrap_err("Failed to serialize values")?;
        println!("{}", output);
    } else {
        println!("{}", style("# Computed Values").cyan().bold());
        print!("{}", cloaked.to_yaml()?);
    }

    let hidden = composed.redactions.paths().len();
    if hidden > 0 {
        eprintln!(
            "{} {} sensitive value(s) hidden",
            style("note:").yellow().bold(),
            hidden
        );
    }

    Ok(())
}
