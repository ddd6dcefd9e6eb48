//! `soldeploy deploy`: instantiate a Solution in the target portal.

use anyhow::{Context, Result, anyhow};
use clap::Args;
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::warn;

use super::{CliConfig, PortalSession};
use crate::deployer::{CancellationToken, DeployOptions, Deployer};
use crate::utils::DeployProgressBar;

#[derive(Args, Debug)]
pub struct DeployCommand {
    /// Id of the Solution item to deploy.
    #[arg(value_name = "SOLUTION_ID")]
    solution_id: String,

    /// Title of the deployed Solution and its folder.
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    snippet: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Tag for the deployed Solution; repeat for several.
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Deployment parameter as `KEY=VALUE`, available to templates as `params.KEY`.
    /// VALUE is read as JSON when it parses, otherwise as a string.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Item creations allowed in flight at once (default from config).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    max_concurrency: Option<u16>,

    /// Deploy into a portal snapshot file instead of a live portal.
    #[arg(long, value_name = "PATH")]
    portal_file: Option<PathBuf>,
}

/// Split `KEY=VALUE`, reading VALUE as JSON when possible.
fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Parameter name is empty in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl DeployCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_deployer_config().await?;
        let session = PortalSession::open(self.portal_file.as_deref(), &config).await?;

        let dictionary = self.template_dictionary(config.dictionary.clone());
        let cancellation = CancellationToken::new();
        let progress = DeployProgressBar::with_visibility("deploy", !cli.no_progress);

        let options = DeployOptions {
            progress_callback: Some(progress.callback()),
            template_dictionary: dictionary,
            title: self.title.clone(),
            snippet: self.snippet.clone(),
            description: self.description.clone(),
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
            max_concurrency: self
                .max_concurrency
                .map_or(config.max_concurrency, usize::from),
            cancellation: cancellation.clone(),
        };

        let interrupt = tokio::spawn({
            let cancellation = cancellation.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after the current step");
                    cancellation.cancel();
                }
            }
        });

        let result = Deployer::new(session.portal())
            .deploy_solution(&self.solution_id, options)
            .await;
        interrupt.abort();

        // Items created before a failure exist in the portal, so a snapshot is
        // written either way.
        session.save().await.context("Failed to save portal snapshot")?;

        let deployed = match result {
            Ok(deployed) => deployed,
            Err(failure) => {
                progress.finish_and_clear();
                return Err(failure.into());
            }
        };
        progress.finish_with_message("done");

        let solution_id = deployed.item.id.as_deref().unwrap_or_default();
        println!(
            "{} {} as {}",
            "Deployed".green().bold(),
            self.solution_id,
            solution_id.bold()
        );
        for (source, target) in &deployed.id_map {
            println!("  {} {} {}", source.dimmed(), "->".dimmed(), target);
        }
        Ok(())
    }

    /// Config seeds first, then `--param` values under `params`.
    fn template_dictionary(&self, mut dictionary: Map<String, Value>) -> Map<String, Value> {
        if self.params.is_empty() {
            return dictionary;
        }
        let params = dictionary
            .entry("params")
            .or_insert_with(|| Value::Object(Map::new()));
        if !params.is_object() {
            *params = Value::Object(Map::new());
        }
        if let Value::Object(params) = params {
            for (key, value) in &self.params {
                params.insert(key.clone(), value.clone());
            }
        }
        dictionary
    }
}
