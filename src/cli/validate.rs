use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use tourguide_core_types::{IssueSeverity, TourIssue};

use super::output::{emit, OutputFormat};
use crate::page::read_tour;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Tour file (JSON, or YAML by extension)
    pub tour: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationReport {
    title: String,
    step_count: usize,
    issues: Vec<TourIssue>,
}

pub async fn cmd_validate(args: ValidateArgs, output: OutputFormat) -> Result<()> {
    // Validate as stored; normalizing first would hide order gaps.
    let tour = read_tour(&args.tour).await?;
    let report = ValidationReport {
        title: tour.title.clone(),
        step_count: tour.steps.len(),
        issues: tour.validate(),
    };

    emit(output, &report, |report| {
        println!(
            "{} ({} steps): {} issue(s)",
            report.title,
            report.step_count,
            report.issues.len()
        );
        for issue in &report.issues {
            let severity = match issue.severity {
                IssueSeverity::Error => "error",
                IssueSeverity::Warning => "warning",
            };
            match issue.step {
                Some(step) => println!("  {severity}: step {}: {}", step + 1, issue.message),
                None => println!("  {severity}: {}", issue.message),
            }
        }
    })?;

    let errors = report
        .issues
        .iter()
        .filter(|issue| issue.severity == IssueSeverity::Error)
        .count();
    if errors > 0 {
        bail!("{} has {} error(s)", args.tour.display(), errors);
    }
    Ok(())
}
