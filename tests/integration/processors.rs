//! Web maps against feature services, from templatizing to deployment.

use serde_json::json;
use solution_deployer::core::{ItemKind, ItemTemplate};
use solution_deployer::deployer::{DeployOptions, deploy_solution};
use solution_deployer::portal::{InMemoryPortal, PortalSnapshot};
use solution_deployer::processors::ProcessorRegistry;
use solution_deployer::test_utils::{FIXTURE_PORTAL_URL, SolutionFixture, template};

const SOURCE_SERVICE: &str = "https://services.source.com/org/arcgis/rest/services/Hydrants/FeatureServer";

fn feature_service() -> ItemTemplate {
    let mut service = template("svc1", "Feature Service", &[]);
    service.properties = json!({"layers": [{"id": 0}, {"id": 1}], "tables": [{"id": 4}]});
    service
}

/// The source organization the map was authored in.
fn source_portal() -> InMemoryPortal {
    let mut snapshot = PortalSnapshot::default();
    snapshot.services.insert(SOURCE_SERVICE.to_string(), "svc1".to_string());
    snapshot.administered.insert("svc1".to_string());
    InMemoryPortal::new(snapshot)
}

#[tokio::test]
async fn test_map_layers_point_at_deployed_service() {
    let mut map = template("map1", "Web Map", &["svc1"]);
    map.item = json!({
        "title": "Hydrant Map",
        "url": "{{portalBaseUrl}}/home/webmap/viewer.html?webmap={{map1.itemId}}"
    });
    map.data = json!({
        "operationalLayers": [
            {"id": "hydrants", "url": "{{svc1.layer0.url}}", "itemId": "{{svc1.layer0.itemId}}"},
            {"id": "basemap", "url": "https://basemaps.example.com/World/MapServer"}
        ],
        "tables": [{"id": "inspections", "url": "{{svc1.layer4.url}}"}]
    });
    let portal = SolutionFixture::new("sol", "Hydrants")
        .with_template(map)
        .with_template(feature_service())
        .build();

    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();
    let service_id = deployed.id_map["svc1"].clone();
    let map_id = deployed.id_map["map1"].clone();
    let service_url = format!("{FIXTURE_PORTAL_URL}/rest/services/{service_id}/FeatureServer");

    let stored = portal.item(&map_id).unwrap();
    let layers = &stored.data["operationalLayers"];
    assert_eq!(layers[0]["url"], json!(format!("{service_url}/0")));
    assert_eq!(layers[0]["itemId"], json!(service_id));
    assert_eq!(layers[1]["url"], json!("https://basemaps.example.com/World/MapServer"));
    assert_eq!(stored.data["tables"][0]["url"], json!(format!("{service_url}/4")));
    assert_eq!(
        stored.item["url"],
        json!(format!("https://fixture.maps.example.com/home/webmap/viewer.html?webmap={map_id}"))
    );
}

#[tokio::test]
async fn test_templatized_map_deploys() {
    let source = source_portal();
    let mut map = ItemTemplate::new("map1", "Web Map");
    map.item = json!({"title": "Hydrant Map"});
    map.data = json!({
        "operationalLayers": [
            {"id": "hydrants", "url": format!("{SOURCE_SERVICE}/0"), "itemId": "svc1"},
            {"id": "valves", "url": format!("{SOURCE_SERVICE}/1"), "itemId": "svc1"}
        ]
    });

    let registry = ProcessorRegistry::default();
    let processor = registry.for_kind(&ItemKind::WebMap);
    let map = processor.convert_item_to_template(map, &source).await.unwrap();
    assert_eq!(map.dependencies, vec!["svc1"]);
    assert_eq!(source.administrator_checks("svc1"), 1);
    assert_eq!(map.data["operationalLayers"][1]["url"], json!("{{svc1.layer1.url}}"));

    let portal = SolutionFixture::new("sol", "Hydrants")
        .with_template(feature_service())
        .with_template(map)
        .build();
    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();

    let service_id = deployed.id_map["svc1"].clone();
    let stored = portal.item(&deployed.id_map["map1"]).unwrap();
    let valves = &stored.data["operationalLayers"][1];
    assert_eq!(
        valves["url"],
        json!(format!("{FIXTURE_PORTAL_URL}/rest/services/{service_id}/FeatureServer/1"))
    );
    assert_eq!(valves["itemId"], json!(service_id));
    assert!(stored.item["url"].as_str().unwrap().ends_with(&deployed.id_map["map1"]));
}

#[tokio::test]
async fn test_unadministered_service_stays_literal() {
    let mut snapshot = PortalSnapshot::default();
    snapshot.services.insert(SOURCE_SERVICE.to_string(), "svc1".to_string());
    let source = InMemoryPortal::new(snapshot);

    let mut map = ItemTemplate::new("map1", "Web Map");
    map.data = json!({"operationalLayers": [{"url": format!("{SOURCE_SERVICE}/0")}]});

    let registry = ProcessorRegistry::default();
    let map = registry
        .for_kind(&ItemKind::WebMap)
        .convert_item_to_template(map, &source)
        .await
        .unwrap();

    assert_eq!(map.dependencies, vec!["svc1"]);
    assert_eq!(map.data["operationalLayers"][0]["url"], json!(format!("{SOURCE_SERVICE}/0")));
}

#[tokio::test]
async fn test_field_references_resolve_after_deployment() {
    let source = source_portal();
    let mut service = feature_service();
    service.properties = json!({
        "layers": [{"id": 0, "fields": [{"name": "STATUS"}, {"name": "FLOW"}]}]
    });
    let mut map = ItemTemplate::new("map1", "Web Map");
    map.data = json!({
        "operationalLayers": [{
            "id": "hydrants",
            "url": format!("{SOURCE_SERVICE}/0"),
            "popupInfo": {"title": "Flow: {FLOW}", "fieldInfos": [{"fieldName": "STATUS"}]},
            "layerDefinition": {
                "definitionExpression": "STATUS <> 'retired'",
                "drawingInfo": {"renderer": {"type": "classBreaks", "field": "FLOW"}}
            }
        }]
    });

    let registry = ProcessorRegistry::default();
    let map = registry.for_kind(&ItemKind::WebMap).convert_item_to_template(map, &source).await.unwrap();
    let mut templates = vec![service, map];
    registry.post_process_field_references(&mut templates);

    let layer = &templates[1].data["operationalLayers"][0];
    assert_eq!(layer["popupInfo"]["fieldInfos"][0]["fieldName"], json!("{{svc1.layer0.fields.status.name}}"));

    let mut fixture = SolutionFixture::new("sol", "Hydrants");
    for template in templates {
        fixture = fixture.with_template(template);
    }
    let portal = fixture.build();
    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();

    let stored = portal.item(&deployed.id_map["map1"]).unwrap();
    let layer = &stored.data["operationalLayers"][0];
    assert_eq!(layer["popupInfo"]["title"], json!("Flow: {FLOW}"));
    assert_eq!(layer["popupInfo"]["fieldInfos"][0]["fieldName"], json!("STATUS"));
    assert_eq!(layer["layerDefinition"]["definitionExpression"], json!("STATUS <> 'retired'"));
    assert_eq!(layer["layerDefinition"]["drawingInfo"]["renderer"]["field"], json!("FLOW"));
}
