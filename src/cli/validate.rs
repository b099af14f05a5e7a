use std::path::PathBuf;

use anyhow::bail;
use clap::Args;

use super::CliContext;
use convoflow::flow::{FlowManager, Severity, validate};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Flow file (.json, .yaml or .yml)
    pub file: PathBuf,
}

pub async fn execute(args: ValidateArgs, _context: &CliContext) -> anyhow::Result<()> {
    let flow = FlowManager::load_flow_from_file(&args.file)?;
    let report = validate(&flow);

    for issue in &report.issues {
        match issue.severity() {
            Severity::Error => println!("error: {}", issue),
            Severity::Warning => println!("warning: {}", issue),
        }
    }

    if report.has_errors() {
        bail!("flow `{}` has {} error(s)", flow.id, report.errors().count());
    }
    if report.is_clean() {
        println!("✅ Flow `{}` is valid.", flow.id);
    } else {
        println!("Flow `{}` is usable with {} warning(s).", flow.id, report.warnings().count());
    }
    Ok(())
}
