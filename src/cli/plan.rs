//! `soldeploy plan`: show how a Solution would be deployed.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::{CliConfig, PortalSession};
use crate::core::SolutionData;
use crate::deployer::estimate_deployment_cost;
use crate::resolver::DependencyGraph;
use crate::utils::DeployProgressBar;

#[derive(Args, Debug)]
pub struct PlanCommand {
    /// Id of the Solution item to inspect.
    #[arg(value_name = "SOLUTION_ID")]
    solution_id: String,

    /// Read from a portal snapshot file instead of a live portal.
    #[arg(long, value_name = "PATH")]
    portal_file: Option<PathBuf>,
}

impl PlanCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_deployer_config().await?;
        let session = PortalSession::open(self.portal_file.as_deref(), &config).await?;
        let portal = session.portal();

        let spinner = DeployProgressBar::spinner("Connecting", !cli.no_progress);
        spinner.set_message(format!("Fetching solution {}", self.solution_id));
        let data = portal
            .fetch_item_data(&self.solution_id)
            .await
            .with_context(|| format!("Failed to fetch data of solution {}", self.solution_id));
        spinner.finish_and_clear();
        let data = data?;
        let solution: SolutionData = serde_json::from_value(data)
            .with_context(|| format!("Solution {} has malformed data", self.solution_id))?;

        let graph = DependencyGraph::from_templates(&solution.templates)?;
        graph.detect_cycles()?;
        let waves = graph.creation_waves()?;

        println!(
            "{} {} ({} items, cost {})",
            "Solution".bold(),
            self.solution_id,
            solution.templates.len(),
            estimate_deployment_cost(&solution.templates)
        );
        for (number, wave) in waves.iter().enumerate() {
            println!("{} {}", format!("Wave {}:", number + 1).cyan(), wave.join(", "));
        }

        let circular: Vec<_> =
            solution.templates.iter().filter(|t| t.has_circular_dependencies()).collect();
        if !circular.is_empty() {
            println!("{}", "Patched after creation:".yellow());
            for template in circular {
                println!("  {} -> {}", template.item_id, template.circular_dependencies.join(", "));
            }
        }
        Ok(())
    }
}
