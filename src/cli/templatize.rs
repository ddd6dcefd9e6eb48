//! `soldeploy templatize`: turn an item into a reusable template.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

use super::{CliConfig, PortalSession};
use crate::core::{ItemTemplate, SolutionData};
use crate::processors::{ProcessorRegistry, datasource_infos};

#[derive(Args, Debug)]
pub struct TemplatizeCommand {
    /// JSON file holding the item as a template (`itemId`, `type`, `item`, `data`).
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Write the template here instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Resolve service references against a portal snapshot file.
    #[arg(long, value_name = "PATH")]
    portal_file: Option<PathBuf>,

    /// Solution data whose feature services supply field names to templatize.
    #[arg(long, value_name = "PATH")]
    solution: Option<PathBuf>,
}

impl TemplatizeCommand {
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let content = fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Failed to read {}", self.input.display()))?;
        let template: ItemTemplate = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse item template {}", self.input.display()))?;

        let config = cli.load_deployer_config().await?;
        let session = PortalSession::open(self.portal_file.as_deref(), &config).await?;

        let registry = ProcessorRegistry::default();
        let processor = registry.for_kind(&template.kind);
        let mut template = processor.convert_item_to_template(template, session.portal()).await?;

        if let Some(path) = &self.solution {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let solution: SolutionData = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse solution data {}", path.display()))?;
            let datasources = datasource_infos(&solution.templates);
            debug!("{} datasources with field lists", datasources.len());
            processor.post_process_field_references(&mut template, &datasources);
        }
        info!(
            "Templatized {} with {} dependencies",
            template.item_id,
            template.dependencies.len()
        );

        let rendered = serde_json::to_string_pretty(&template)?;
        match &self.output {
            Some(path) => fs::write(path, rendered + "\n")
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => println!("{rendered}"),
        }
        Ok(())
    }
}
