//! Element inspection against page fixtures: locator capture, drafting
//! context, and target resolution.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::fs;

use tour_dom::{element_identity, DomPort};
use tour_locator::{capture, capture_element_context, LocatorResolver};
use tourguide_core_types::{PlaybackSession, Target};

use super::context::CliContext;
use super::output::{emit, OutputFormat};
use crate::page::read_page;

#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    /// Page fixture (document plus editor blocks)
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    /// CSS selector of the element; the first match in the main document or
    /// the editor frame is used
    #[arg(long)]
    pub selector: String,
}

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Page fixture (document plus editor blocks)
    #[arg(long, value_name = "FILE")]
    pub dom: PathBuf,

    /// Target as inline JSON or a path to a JSON file
    #[arg(long)]
    pub target: String,
}

pub async fn cmd_capture(args: InspectArgs, output: OutputFormat) -> Result<()> {
    let page = read_page(&args.dom).await?;
    let element = page.find(&args.selector)?;
    let target = capture(page.dom.as_ref(), element);

    emit(output, &target, |target| {
        println!("{} locator(s) for {}", target.locators.len(), args.selector);
        for locator in &target.locators {
            println!("  [{:>3}] {}", locator.weight, locator);
        }
    })
}

pub async fn cmd_context(args: InspectArgs, output: OutputFormat) -> Result<()> {
    let page = read_page(&args.dom).await?;
    let element = page.find(&args.selector)?;
    let context = capture_element_context(page.dom.as_ref(), element);
    // Only machine formats are meaningful here.
    let format = match output {
        OutputFormat::Human => OutputFormat::Json,
        other => other,
    };
    emit(format, &context, |_| {})
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveReport {
    element: String,
    locator: String,
    scope: &'static str,
    candidates: usize,
}

pub async fn cmd_resolve(args: ResolveArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let target = read_target(&args.target).await?;
    let page = read_page(&args.dom).await?;
    let resolver = LocatorResolver::new(
        page.dom.clone(),
        page.editor.clone(),
        PlaybackSession::new(),
        ctx.playback_config(),
    );

    let resolution = resolver
        .resolve(&target)
        .await
        .map_err(|err| anyhow!("target did not resolve: {err}"))?;
    let report = ResolveReport {
        element: element_identity(page.dom.as_ref() as &dyn DomPort, resolution.element),
        locator: resolution.used_locator.to_string(),
        scope: resolution.scope.name(),
        candidates: resolution.candidates,
    };
    emit(output, &report, |report| {
        println!(
            "{} via {} in {} ({} candidate(s))",
            report.element, report.locator, report.scope, report.candidates
        );
    })
}

async fn read_target(raw: &str) -> Result<Target> {
    let json = if raw.trim_start().starts_with('{') {
        raw.to_string()
    } else {
        fs::read_to_string(raw)
            .await
            .with_context(|| format!("reading {raw}"))?
    };
    serde_json::from_str(&json).context("parsing target")
}
