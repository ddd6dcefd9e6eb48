//! Deployments that stop early.

use serde_json::json;
use solution_deployer::core::{DeployError, DeployStage};
use solution_deployer::deployer::{CancellationToken, DeployOptions, deploy_solution};
use solution_deployer::portal::{PortalEvent, PortalOperation};
use solution_deployer::test_utils::{SolutionFixture, recording_progress, template};

#[tokio::test]
async fn test_fetch_failure_names_what_failed() {
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("a", "Web Map", &[]))
        .build();
    portal.fail_operation(PortalOperation::FetchCurrentUser);

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::Fetching);
    assert!(matches!(failure.error, DeployError::FetchFailure { what: "current user", .. }));
    assert!(portal.events().is_empty());
}

#[tokio::test]
async fn test_unknown_solution() {
    let portal = SolutionFixture::new("sol", "Water").build();
    let failure = deploy_solution(&portal, "missing", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::Fetching);
    assert!(matches!(failure.error, DeployError::FetchFailure { .. }));
}

#[tokio::test]
async fn test_malformed_solution_data() {
    let portal = SolutionFixture::new("sol", "Water").build();
    portal.insert_item("bad", json!({"title": "Bad", "type": "Solution"}), json!({"templates": 7}));

    let failure = deploy_solution(&portal, "bad", DeployOptions::default()).await.unwrap_err();
    assert!(matches!(failure.error, DeployError::InvalidSolutionData { .. }));
}

#[tokio::test]
async fn test_cycle_rejected_before_anything_is_created() {
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("a", "Web Map", &["b"]))
        .with_template(template("b", "Web Map", &["c"]))
        .with_template(template("c", "Web Map", &["a"]))
        .build();

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::Fetching);
    match &failure.error {
        DeployError::DependencyCycle { cycle } => {
            assert!(cycle.contains('a') && cycle.contains('b') && cycle.contains('c'), "{cycle}");
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(portal.events().is_empty(), "{:?}", portal.events());
}

#[tokio::test]
async fn test_item_failure_stops_the_run() {
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("base", "Feature Service", &[]))
        .with_template(template("broken", "Web Map", &["base"]))
        .with_template(template("after", "Dashboard", &["broken"]))
        .build();
    portal.fail_item_titled("broken");

    let failure = deploy_solution(&portal, "sol", DeployOptions::default().with_max_concurrency(1))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, DeployStage::DeployingItems);
    assert_eq!(failure.item_id(), Some("broken"));

    let events = portal.events();
    assert!(!events.iter().any(|e| matches!(e, PortalEvent::CreateItemStarted { title } if title == "after")));
    // No rollback: the solution item and the first item remain.
    let created = events.iter().filter(|e| matches!(e, PortalEvent::ItemCreated { .. })).count();
    assert_eq!(created, 2);
    assert!(!events.iter().any(|e| matches!(e, PortalEvent::ItemUpdated { .. })));
}

#[tokio::test]
async fn test_missing_dependency_value_fails_item() {
    let mut map = template("map", "Web Map", &["svc"]);
    map.data = json!({"url": "{{svc.layer3.url}}"});
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("svc", "Web Map", &[]))
        .with_template(map)
        .build();

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::DeployingItems);
    assert_eq!(failure.item_id(), Some("map"));
    let DeployError::ItemCreationFailure { source, .. } = &failure.error else {
        panic!("expected an item failure, got {:?}", failure.error);
    };
    assert!(matches!(
        source.downcast_ref::<DeployError>(),
        Some(DeployError::MissingSubstitution { path }) if path == "svc.layer3.url"
    ));
    // The map was never sent to the portal.
    assert!(!portal.events().iter().any(
        |e| matches!(e, PortalEvent::CreateItemStarted { title } if title == "map")
    ));
}

#[tokio::test]
async fn test_unknown_transform_names_the_item() {
    let mut map = template("map", "Web Map", &[]);
    map.data = json!({"title": "{{portalBaseUrl:reverse}}"});
    let portal = SolutionFixture::new("sol", "Water").with_template(map).build();

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.item_id(), Some("map"));
    let DeployError::ItemCreationFailure { source, .. } = &failure.error else {
        panic!("expected an item failure, got {:?}", failure.error);
    };
    assert!(matches!(
        source.downcast_ref::<DeployError>(),
        Some(DeployError::UnknownTransform { name }) if name == "reverse"
    ));
}

#[tokio::test]
async fn test_parameter_substitution_failure_names_the_item() {
    let mut app = template("app", "Dashboard", &[]);
    app.data = json!({"region": "{{params.region:shout}}"});
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(app)
        .with_params(json!({"region": "north"}))
        .build();

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.item_id(), Some("app"));
    assert!(portal.events().is_empty());
}

#[tokio::test]
async fn test_folder_failure() {
    let portal = SolutionFixture::new("sol", "Water").build();
    portal.fail_operation(PortalOperation::CreateFolder);

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::FolderReady);
    assert!(matches!(failure.error, DeployError::FolderCreationFailure { .. }));
}

#[tokio::test]
async fn test_extent_failure() {
    let portal = SolutionFixture::new("sol", "Water").build();
    portal.fail_operation(PortalOperation::ReprojectExtent);

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::ExtentResolved);
    assert!(matches!(failure.error, DeployError::ExtentResolutionFailure { .. }));
}

#[tokio::test]
async fn test_finalization_failure() {
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("a", "Web Map", &[]))
        .build();
    portal.fail_operation(PortalOperation::UpdateItem);

    let failure = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::Finalizing);
    assert!(matches!(failure.error, DeployError::FinalizationFailure { .. }));
}

#[tokio::test]
async fn test_cancelled_before_items() {
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("a", "Web Map", &[]))
        .build();
    let token = CancellationToken::new();
    let (record, values) = recording_progress();
    let cancel_at_solution_item = {
        let token = token.clone();
        move |percent: f64| {
            (*record)(percent);
            if percent >= 3.0 {
                token.cancel();
            }
        }
    };
    let options = DeployOptions::default()
        .with_progress_callback(cancel_at_solution_item)
        .with_cancellation(token);

    let failure = deploy_solution(&portal, "sol", options).await.unwrap_err();
    assert_eq!(failure.stage, DeployStage::DeployingItems);
    assert!(matches!(failure.error, DeployError::Cancelled));
    assert_eq!(values.lock().unwrap().last(), Some(&3.0));
    assert!(!portal.events().iter().any(|e| matches!(e, PortalEvent::CreateItemStarted { title } if title == "a")));
}

#[tokio::test]
async fn test_cancelled_up_front() {
    let portal = SolutionFixture::new("sol", "Water").build();
    let token = CancellationToken::new();
    token.cancel();

    let failure = deploy_solution(&portal, "sol", DeployOptions::default().with_cancellation(token))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, DeployStage::Fetching);
    assert!(matches!(failure.error, DeployError::Cancelled));
    assert!(portal.events().is_empty());
}
