//! End-to-end deployments that succeed.

use serde_json::json;
use solution_deployer::deployer::{DeployOptions, deploy_solution};
use solution_deployer::portal::PortalEvent;
use solution_deployer::test_utils::{
    SolutionFixture, init_test_logging, recording_progress, template,
};

#[tokio::test]
async fn test_single_item_progress_sequence() {
    init_test_logging(None);
    let mut item = template("a", "Web Map", &[]);
    item.estimated_cost = 10.0;
    let portal = SolutionFixture::new("sol", "Water").with_template(item).build();

    let (callback, values) = recording_progress();
    let options = DeployOptions {
        progress_callback: Some(callback),
        ..DeployOptions::default()
    };
    deploy_solution(&portal, "sol", options).await.unwrap();

    let values = values.lock().unwrap().clone();
    assert_eq!(values, vec![0.0, 2.0, 3.0, 98.0, 100.0]);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_100() {
    let mut first = template("a", "Feature Service", &[]);
    first.estimated_cost = 3.0;
    let second = template("b", "Web Map", &["a"]);
    let third = template("c", "Dashboard", &["b"]);
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(first)
        .with_template(second)
        .with_template(third)
        .build();

    let (callback, values) = recording_progress();
    let options = DeployOptions {
        progress_callback: Some(callback),
        ..DeployOptions::default()
    };
    deploy_solution(&portal, "sol", options).await.unwrap();

    let values = values.lock().unwrap().clone();
    assert!(values.windows(2).all(|pair| pair[0] <= pair[1]), "{values:?}");
    assert_eq!(values.first(), Some(&0.0));
    assert_eq!(values.last(), Some(&100.0));
    // 3 + 95 * (3 / 5)
    assert!((values[3] - 60.0).abs() < 1e-9, "{values:?}");
}

#[tokio::test]
async fn test_deployed_solution_item() {
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("a", "Feature Service", &[]))
        .with_template(template("b", "Web Map", &["a"]))
        .build();

    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();
    let new_id = deployed.item.id.clone().unwrap();
    assert_ne!(new_id, "sol");

    let stored = portal.item(&new_id).unwrap();
    assert_eq!(stored.item["type"], json!("Solution"));
    assert_eq!(stored.item["title"], json!("Water"));
    assert_eq!(stored.item["typeKeywords"], json!(["Solution", "Deployed"]));
    assert_eq!(stored.item["owner"], json!("deployer"));
    assert!(stored.item.get("numViews").is_none());
    assert!(stored.item.get("created").is_none());

    // Raw URLs carrying the source id point at the new item.
    let thumbnail = stored.item["thumbnailUrl"].as_str().unwrap();
    assert!(thumbnail.contains(&new_id), "{thumbnail}");
    assert!(!thumbnail.contains("/items/sol/"), "{thumbnail}");

    // Web Mercator default extent projected to WGS84.
    let extent = stored.item["extent"].as_array().unwrap();
    let lower_left = extent[0].as_array().unwrap();
    let upper_right = extent[1].as_array().unwrap();
    assert!((lower_left[0].as_f64().unwrap() + 180.0).abs() < 1e-6);
    assert!(lower_left[1].as_f64().unwrap().abs() < 1e-6);
    assert!((upper_right[1].as_f64().unwrap() - 85.051_128).abs() < 1e-4);

    // The manifest names destination ids only.
    let a = deployed.id_map["a"].clone();
    let b = deployed.id_map["b"].clone();
    assert_eq!(
        stored.data["templates"],
        json!([
            {"itemId": a, "type": "Feature Service", "dependencies": [], "circularDependencies": []},
            {"itemId": b, "type": "Web Map", "dependencies": [a], "circularDependencies": []}
        ])
    );
    assert_eq!(deployed.data.templates.len(), 2);
}

#[tokio::test]
async fn test_caller_overrides_title_and_tags() {
    let portal = SolutionFixture::new("sol", "Water")
        .with_template(template("a", "Web Map", &[]))
        .build();
    let options = DeployOptions {
        snippet: Some("For the north district".into()),
        tags: Some(vec!["north".into()]),
        ..DeployOptions::default()
    }
    .with_title("Water North");

    let deployed = deploy_solution(&portal, "sol", options).await.unwrap();
    let stored = portal.item(deployed.item.id.as_deref().unwrap()).unwrap();
    assert_eq!(stored.item["title"], json!("Water North"));
    assert_eq!(stored.item["snippet"], json!("For the north district"));
    assert_eq!(stored.item["tags"], json!(["north"]));
    assert!(
        portal
            .events()
            .contains(&PortalEvent::FolderCreated { title: "Water North".into() })
    );
}

#[tokio::test]
async fn test_placeholders_resolve_from_run_values() {
    let mut map = template("m", "Web Map", &[]);
    map.item = json!({
        "title": "Map for {{params.region}}",
        "url": "{{portalBaseUrl}}/home/webmap/viewer.html",
        "snippet": "Owned by {{user.username}}"
    });
    map.data = json!({
        "zoom": "{{params.zoom}}",
        "extent": "{{solutionItemExtent}}",
        "folder": "{{folderId}}",
        "host": "{{portalBaseUrl:lowerCase}}",
        "unknown": "{{never.set||fallback}}"
    });
    let portal = SolutionFixture::new("sol", "Water")
        .with_params(json!({"region": "North", "zoom": 4}))
        .with_template(map)
        .build();

    let mut options = DeployOptions::default();
    options.template_dictionary.insert("params".into(), json!({"region": "South"}));
    let deployed = deploy_solution(&portal, "sol", options).await.unwrap();

    let stored = portal.item(&deployed.id_map["m"]).unwrap();
    assert_eq!(stored.item["title"], json!("Map for South"));
    assert_eq!(
        stored.item["url"],
        json!("https://fixture.maps.example.com/home/webmap/viewer.html")
    );
    assert_eq!(stored.item["snippet"], json!("Owned by deployer"));
    assert_eq!(stored.data["zoom"], json!(4));
    assert_eq!(stored.data["folder"], json!(stored.folder_id.clone().unwrap()));
    assert_eq!(stored.data["host"], json!("https://fixture.maps.example.com"));
    assert_eq!(stored.data["unknown"], json!("fallback"));
    let west: f64 = stored.data["extent"].as_str().unwrap().split(',').next().unwrap().parse().unwrap();
    assert!((west + 180.0).abs() < 1e-6);
    assert_eq!(deployed.data.params, Some(json!({"region": "South", "zoom": 4})));
}

#[tokio::test]
async fn test_soft_references_stay_literal() {
    let mut map = template("m", "Web Map", &["external"]);
    map.data = json!({"basemap": "{{external.itemId}}"});
    let portal = SolutionFixture::new("sol", "Water").with_template(map).build();

    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();
    let stored = portal.item(&deployed.id_map["m"]).unwrap();
    assert_eq!(stored.data["basemap"], json!("{{external.itemId}}"));
    assert_eq!(deployed.data.templates[0].dependencies, vec!["external"]);
}

#[tokio::test]
async fn test_self_reference_patched_after_creation() {
    let mut app = template("app", "Web Mapping Application", &[]);
    app.item = json!({
        "title": "app",
        "url": "{{portalBaseUrl}}/apps/view/index.html?appid={{app.itemId}}"
    });
    let portal = SolutionFixture::new("sol", "Water").with_template(app).build();

    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();
    let id = deployed.id_map["app"].clone();
    let stored = portal.item(&id).unwrap();
    assert_eq!(
        stored.item["url"],
        json!(format!("https://fixture.maps.example.com/apps/view/index.html?appid={id}"))
    );
    assert!(portal.events().contains(&PortalEvent::ItemUpdated { id: id.clone() }));
}

#[tokio::test]
async fn test_empty_solution() {
    let portal = SolutionFixture::new("sol", "Empty").build();
    let (callback, values) = recording_progress();
    let options = DeployOptions {
        progress_callback: Some(callback),
        ..DeployOptions::default()
    };

    let deployed = deploy_solution(&portal, "sol", options).await.unwrap();
    assert!(deployed.id_map.is_empty());
    assert!(deployed.data.templates.is_empty());
    assert_eq!(values.lock().unwrap().last(), Some(&100.0));
}
