use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tokio::fs;
use tracing::info;

use tour_dom::MemoryDom;
use tour_store::{AiTourRequest, HttpTourApi, TourStore};
use tourguide_core_types::{Tour, TourId};

use super::context::CliContext;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ToursArgs {
    #[command(subcommand)]
    pub action: ToursAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ToursAction {
    /// List tours stored on the service
    List,

    /// Show one tour
    Show {
        /// Tour id
        id: u64,

        /// Also write the tour to this file
        #[arg(long, value_name = "FILE")]
        save_to: Option<PathBuf>,
    },

    /// List the predefined tasks tours can be generated for
    Tasks,

    /// Generate a one-off tour for a task or a free-form request
    Generate {
        /// Predefined task id
        #[arg(long, conflicts_with = "query")]
        task: Option<String>,

        /// Free-form description of what the learner wants to do
        #[arg(long)]
        query: Option<String>,

        /// Write the generated tour to this file
        #[arg(long, value_name = "FILE")]
        save_to: Option<PathBuf>,
    },
}

pub async fn cmd_tours(args: ToursArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let api = HttpTourApi::new(ctx.config().api.clone())?;
    // Service calls here never touch the document.
    let store = TourStore::new(
        Arc::new(api),
        Arc::new(MemoryDom::new()),
        ctx.config().post_type.clone(),
    );

    match args.action {
        ToursAction::List => {
            let tours = store.load_tours().await?;
            emit(output, &tours, |tours| {
                if tours.is_empty() {
                    println!("No tours");
                }
                for tour in tours {
                    let id = tour.id.map_or_else(|| "-".to_string(), |id| id.to_string());
                    println!("{id:>6}  {} ({} steps)", tour.title, tour.steps.len());
                }
            })?;
        }
        ToursAction::Show { id, save_to } => {
            let tour = store.load_tour(TourId(id)).await?;
            if let Some(path) = save_to {
                write_tour(&path, &tour).await?;
            }
            emit(output, &tour, print_tour)?;
        }
        ToursAction::Tasks => {
            let tasks = store.fetch_ai_tasks().await?;
            emit(output, &tasks, |tasks| {
                for task in tasks {
                    println!("{:<24} {}", task.id, task.title);
                }
            })?;
        }
        ToursAction::Generate {
            task,
            query,
            save_to,
        } => {
            let post_type = ctx.config().post_type.clone();
            let request = match (task, query) {
                (Some(task), _) => AiTourRequest::for_task(task, post_type),
                (None, Some(query)) => AiTourRequest::for_query(query, post_type),
                (None, None) => bail!("either --task or --query is required"),
            };
            let tour = store.generate_ai_tour(request).await?;
            if let Some(path) = save_to {
                write_tour(&path, &tour).await?;
            }
            emit(output, &tour, print_tour)?;
        }
    }
    Ok(())
}

fn print_tour(tour: &Tour) {
    println!("{} ({} steps)", tour.title, tour.steps.len());
    for step in &tour.steps {
        let target = step
            .target
            .locators
            .first()
            .map_or_else(|| "no target".to_string(), |locator| locator.to_string());
        println!("  {}. {} [{}]", step.order + 1, step.title, target);
    }
}

async fn write_tour(path: &PathBuf, tour: &Tour) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(tour)?)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "tour written");
    Ok(())
}
