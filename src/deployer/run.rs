//! One deployment run: the stage sequence and the state it threads through.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::progress::{self, ProgressTracker};
use super::{DeployOptions, DeployedSolution, checked_replace_all, create_unique_folder};
use crate::core::{
    DeployError, DeployStage, DeployedSolutionData, ItemKind, ItemMetadata, ItemPayload,
    ItemTemplate, NormalizedTemplate, SolutionData,
};
use crate::portal::{Extent, Folder, Portal, PortalDescriptor, User, WGS84_WKID};
use crate::processors::ProcessorRegistry;
use crate::resolver::DependencyGraph;
use crate::templating::{ResolvePolicy, SubstitutionDictionary};

const SOLUTION_KEYWORD: &str = "Solution";
const DEPLOYED_KEYWORD: &str = "Deployed";

/// Everything the `Fetching` stage retrieves.
struct Fetched {
    item: ItemMetadata,
    solution: SolutionData,
    descriptor: PortalDescriptor,
    user: User,
    folders: Vec<Folder>,
}

/// The Solution item as created on the destination.
struct SolutionItem {
    id: String,
    metadata: ItemMetadata,
}

pub(super) struct DeploymentRun<'a> {
    pub(super) portal: &'a dyn Portal,
    pub(super) registry: &'a ProcessorRegistry,
    pub(super) options: DeployOptions,
    pub(super) dictionary: SubstitutionDictionary,
    pub(super) progress: ProgressTracker,
    stage: DeployStage,
}

impl<'a> DeploymentRun<'a> {
    pub(super) fn new(
        portal: &'a dyn Portal,
        registry: &'a ProcessorRegistry,
        options: DeployOptions,
    ) -> Self {
        let dictionary = SubstitutionDictionary::from_seed(options.template_dictionary.clone());
        let progress = ProgressTracker::new(options.progress_callback.clone());
        Self {
            portal,
            registry,
            options,
            dictionary,
            progress,
            stage: DeployStage::Fetching,
        }
    }

    pub(super) fn stage(&self) -> DeployStage {
        self.stage
    }

    /// Move to `stage` unless the run has been cancelled.
    fn enter(&mut self, stage: DeployStage) -> Result<(), DeployError> {
        self.stage = stage;
        self.options.cancellation.check()?;
        info!("Stage: {}", stage);
        Ok(())
    }

    pub(super) async fn execute(&mut self, solution_id: &str) -> Result<DeployedSolution, DeployError> {
        self.enter(DeployStage::Fetching)?;
        self.progress.report(progress::STARTED);
        let fetched = self.fetch(solution_id).await?;
        let Fetched {
            item,
            mut solution,
            descriptor,
            user,
            folders,
        } = fetched;
        let graph = DependencyGraph::from_templates(&solution.templates)?;
        graph.detect_cycles()?;
        self.seed_dictionary(&descriptor, &user, &folders)?;
        self.substitute_params(&mut solution)?;

        self.enter(DeployStage::FolderReady)?;
        let title = self.options.title.clone().unwrap_or_else(|| item.title.clone());
        let folder = create_unique_folder(self.portal, &title, &folders).await.map_err(|source| {
            DeployError::FolderCreationFailure {
                title: title.clone(),
                source,
            }
        })?;
        info!("Deploying into folder '{}'", folder.title);
        self.dictionary.set("folderId", Value::String(folder.id.clone()))?;
        self.progress.report(progress::FOLDER_READY);

        self.enter(DeployStage::ExtentResolved)?;
        let extent = self.resolve_extent(&descriptor).await?;
        self.dictionary.set("solutionItemExtent", Value::String(extent.to_bbox_string()))?;

        self.enter(DeployStage::SolutionItemCreated)?;
        let solution_item = self.create_solution_item(solution_id, item, title, &extent, &folder).await?;
        self.progress.report(progress::SOLUTION_ITEM_CREATED);

        self.enter(DeployStage::DeployingItems)?;
        self.progress.begin_items(&solution.templates);
        self.deploy_items(&solution.templates, &graph, &folder.id).await?;

        self.enter(DeployStage::ResolvingCircularDependencies)?;
        self.resolve_circular_dependencies(&solution.templates, &folder.id).await?;

        self.enter(DeployStage::Finalizing)?;
        let deployed = self.finalize(solution_item, solution, &folder.id).await?;
        self.stage = DeployStage::Done;
        Ok(deployed)
    }

    /// Fetch the five inputs concurrently; the first failure wins.
    async fn fetch(&self, solution_id: &str) -> Result<Fetched, DeployError> {
        let portal = self.portal;
        let fetch_failure = |what: &'static str| {
            move |source: anyhow::Error| DeployError::FetchFailure {
                what,
                source,
            }
        };

        let (item, data, descriptor, user, folders) = tokio::try_join!(
            async { portal.fetch_item_base(solution_id).await.map_err(fetch_failure("solution item")) },
            async { portal.fetch_item_data(solution_id).await.map_err(fetch_failure("solution data")) },
            async { portal.fetch_portal_descriptor().await.map_err(fetch_failure("portal descriptor")) },
            async { portal.fetch_current_user().await.map_err(fetch_failure("current user")) },
            async { portal.fetch_user_folders().await.map_err(fetch_failure("user folders")) },
        )?;

        let solution: SolutionData =
            serde_json::from_value(data).map_err(|err| DeployError::InvalidSolutionData {
                reason: err.to_string(),
            })?;
        debug!("Solution {} has {} templates", solution_id, solution.templates.len());

        Ok(Fetched {
            item,
            solution,
            descriptor,
            user,
            folders,
        })
    }

    /// Static values every template may reference.
    fn seed_dictionary(
        &mut self,
        descriptor: &PortalDescriptor,
        user: &User,
        folders: &[Folder],
    ) -> Result<(), DeployError> {
        let dictionary = &mut self.dictionary;
        dictionary.set("isPortal", Value::Bool(descriptor.is_portal))?;
        dictionary.set("organization", to_json(descriptor)?)?;
        if !dictionary.contains("portalBaseUrl") {
            let base_url = descriptor
                .organization_base_url()
                .unwrap_or_else(|| self.portal.portal_url().to_string());
            dictionary.set("portalBaseUrl", Value::String(base_url))?;
        }
        dictionary.set("user", to_json(user)?)?;
        dictionary.set("user.folders", to_json(folders)?)?;
        dictionary.set("deployedAt", Value::String(chrono::Utc::now().to_rfc3339()))?;
        Ok(())
    }

    /// Publish the Solution's parameters and resolve them into every template.
    fn substitute_params(&mut self, solution: &mut SolutionData) -> Result<(), DeployError> {
        let Some(mut params) = solution.params.clone() else {
            return Ok(());
        };
        // Caller-seeded parameters override the Solution's defaults.
        if let (Value::Object(merged), Some(Value::Object(seeded))) =
            (&mut params, self.dictionary.get("params"))
        {
            for (key, value) in seeded {
                merged.insert(key.clone(), value.clone());
            }
        }
        self.dictionary.set("params", params.clone())?;
        solution.params = Some(params);

        let policy = ResolvePolicy::lenient();
        for template in &mut solution.templates {
            let resolve = |value: &Value| {
                self.dictionary
                    .resolve(value, &policy)
                    .map_err(|err| DeployError::item_creation(&template.item_id, err))
            };
            let (item, data, properties) =
                (resolve(&template.item)?, resolve(&template.data)?, resolve(&template.properties)?);
            template.item = item;
            template.data = data;
            template.properties = properties;
        }
        Ok(())
    }

    /// The organization's default extent in WGS84.
    async fn resolve_extent(&self, descriptor: &PortalDescriptor) -> Result<Extent, DeployError> {
        let extent = descriptor.default_extent;
        // An extent without a spatial reference is taken as geographic already.
        if matches!(extent.wkid(), None | Some(WGS84_WKID)) {
            return Ok(extent);
        }

        let geometry_url = descriptor
            .helper_services
            .geometry
            .as_ref()
            .map(|service| service.url.as_str())
            .ok_or_else(|| DeployError::ExtentResolutionFailure {
                source: anyhow::anyhow!("The organization has no geometry service"),
            })?;
        self.portal.reproject_extent(&extent, WGS84_WKID, geometry_url).await.map_err(|source| {
            DeployError::ExtentResolutionFailure {
                source,
            }
        })
    }

    async fn create_solution_item(
        &mut self,
        source_id: &str,
        source: ItemMetadata,
        title: String,
        extent: &Extent,
        folder: &Folder,
    ) -> Result<SolutionItem, DeployError> {
        let mut metadata = source;
        metadata.strip_non_creatable();
        metadata.title = title;
        if let Some(snippet) = &self.options.snippet {
            metadata.snippet = Some(snippet.clone());
        }
        if let Some(description) = &self.options.description {
            metadata.description = Some(description.clone());
        }
        if let Some(tags) = &self.options.tags {
            metadata.tags = tags.clone();
        }
        metadata.kind = Some(ItemKind::Solution);
        metadata.type_keywords = vec![SOLUTION_KEYWORD.to_string()];
        metadata.extent = Some(json!([[extent.xmin, extent.ymin], [extent.xmax, extent.ymax]]));

        let payload = ItemPayload {
            item: to_json(&metadata)?,
            data: Value::Object(Map::new()),
        };
        let created = self.portal.create_item(&payload, &folder.id).await.map_err(|source| {
            DeployError::SolutionItemCreationFailure {
                source,
            }
        })?;
        info!("Created solution item {}", created.id);
        self.dictionary.set("solutionItemId", Value::String(created.id.clone()))?;

        // These are raw URLs carrying the source id, not templates.
        metadata.thumbnail_url =
            checked_replace_all(metadata.thumbnail_url.as_deref(), source_id, &created.id);
        metadata.tryit_url = checked_replace_all(metadata.tryit_url.as_deref(), source_id, &created.id);
        metadata.url = checked_replace_all(metadata.url.as_deref(), source_id, &created.id);
        metadata.id = Some(created.id.clone());

        Ok(SolutionItem {
            id: created.id,
            metadata,
        })
    }

    /// Store the manifest and mark the Solution deployed.
    async fn finalize(
        &mut self,
        solution_item: SolutionItem,
        solution: SolutionData,
        folder_id: &str,
    ) -> Result<DeployedSolution, DeployError> {
        let policy = ResolvePolicy::lenient();
        let params = solution.params.as_ref().map(|p| self.dictionary.resolve(p, &policy)).transpose()?;
        let extra = match self.dictionary.resolve(&Value::Object(solution.extra), &policy)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let id_map: BTreeMap<String, String> = solution
            .templates
            .iter()
            .filter_map(|t| Some((t.item_id.clone(), self.dictionary.item_id(&t.item_id)?.to_string())))
            .collect();
        let templates =
            solution.templates.iter().map(|template| map_ids(template, &id_map)).collect();
        let data = DeployedSolutionData {
            templates,
            params,
            extra,
        };

        let SolutionItem {
            id,
            mut metadata,
        } = solution_item;
        if !metadata.type_keywords.iter().any(|k| k == DEPLOYED_KEYWORD) {
            metadata.type_keywords.push(DEPLOYED_KEYWORD.to_string());
        }

        let mut item = to_json(&metadata)?;
        if let Value::Object(map) = &mut item {
            map.remove("id");
        }
        let payload = ItemPayload {
            item,
            data: to_json(&data)?,
        };
        self.portal.update_item(&id, &payload, folder_id).await.map_err(|source| {
            DeployError::FinalizationFailure {
                source,
            }
        })?;
        self.progress.report(progress::COMPLETE);

        Ok(DeployedSolution {
            item: metadata,
            data,
            id_map,
        })
    }
}

/// Normalize a template and point its ids at their destination counterparts.
fn map_ids(template: &ItemTemplate, id_map: &BTreeMap<String, String>) -> NormalizedTemplate {
    let map = |id: &String| id_map.get(id).cloned().unwrap_or_else(|| id.clone());
    let normalized = template.normalized();
    NormalizedTemplate {
        item_id: map(&normalized.item_id),
        kind: normalized.kind,
        dependencies: normalized.dependencies.iter().map(map).collect(),
        circular_dependencies: normalized.circular_dependencies.iter().map(map).collect(),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value, DeployError> {
    serde_json::to_value(value).map_err(|err| DeployError::InvalidSolutionData {
        reason: err.to_string(),
    })
}
