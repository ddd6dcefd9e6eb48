//! The `soldeploy` binary against portal snapshot files.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use solution_deployer::portal::PortalSnapshot;
use solution_deployer::test_utils::{SolutionFixture, template};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_snapshot(dir: &Path, fixture: &SolutionFixture) -> PathBuf {
    let path = dir.join("portal.json");
    std::fs::write(&path, serde_json::to_string_pretty(&fixture.snapshot()).unwrap()).unwrap();
    path
}

fn soldeploy(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("soldeploy").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("SOLDEPLOY_TOKEN")
        .arg("--no-progress")
        .arg("--config")
        .arg(dir.join("config.toml"));
    cmd
}

fn fixture() -> SolutionFixture {
    let mut map = template("map", "Web Map", &["svc"]);
    map.item = json!({"title": "Map for {{params.region}}"});
    SolutionFixture::new("sol", "Hydrants")
        .with_params(json!({"region": "north"}))
        .with_template(template("svc", "Feature Service", &[]))
        .with_template(map)
}

#[test]
fn test_deploy_writes_snapshot() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = write_snapshot(temp.path(), &fixture());

    soldeploy(temp.path())
        .args(["deploy", "sol", "--param", "region=south", "--tag", "water"])
        .arg("--portal-file")
        .arg(&snapshot_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployed sol as"))
        .stdout(predicate::str::contains("map ->"));

    let snapshot: PortalSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    let deployed = snapshot
        .items
        .values()
        .find(|stored| {
            stored.item["typeKeywords"]
                .as_array()
                .is_some_and(|keywords| keywords.contains(&json!("Deployed")))
        })
        .expect("deployed solution item");
    assert_eq!(deployed.item["tags"], json!(["water"]));
    assert!(
        snapshot.items.values().any(|stored| stored.item["title"] == json!("Map for south")),
        "{:?}",
        snapshot.items
    );
    assert_eq!(snapshot.folders.len(), 1);
}

#[test]
fn test_deploy_failure_reports_stage() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = write_snapshot(temp.path(), &fixture());

    soldeploy(temp.path())
        .args(["deploy", "nope"])
        .arg("--portal-file")
        .arg(&snapshot_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("fetching solution"));
}

#[test]
fn test_deploy_without_portal_configured() {
    let temp = TempDir::new().unwrap();
    soldeploy(temp.path())
        .args(["deploy", "sol"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No portal configured"));
}

#[test]
fn test_plan_lists_waves() {
    let temp = TempDir::new().unwrap();
    let fixture = fixture().with_template(template("app", "Dashboard", &["map", "svc"]));
    let snapshot_path = write_snapshot(temp.path(), &fixture);

    soldeploy(temp.path())
        .args(["plan", "sol"])
        .arg("--portal-file")
        .arg(&snapshot_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wave 1: svc"))
        .stdout(predicate::str::contains("Wave 2: map"))
        .stdout(predicate::str::contains("Wave 3: app"));

    // Planning creates nothing.
    let snapshot: PortalSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    assert_eq!(snapshot.items.len(), 1);
}

#[test]
fn test_plan_reports_cycle() {
    let temp = TempDir::new().unwrap();
    let fixture = SolutionFixture::new("sol", "Loop")
        .with_template(template("a", "Web Map", &["b"]))
        .with_template(template("b", "Web Map", &["a"]));
    let snapshot_path = write_snapshot(temp.path(), &fixture);

    soldeploy(temp.path())
        .args(["plan", "sol"])
        .arg("--portal-file")
        .arg(&snapshot_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Circular dependency detected"));
}

#[test]
fn test_templatize_web_map() {
    let temp = TempDir::new().unwrap();
    let service = "https://services.source.com/rest/services/Hydrants/FeatureServer";
    let mut snapshot = PortalSnapshot::default();
    snapshot.services.insert(service.to_string(), "svc".to_string());
    snapshot.administered.insert("svc".to_string());
    let snapshot_path = temp.path().join("source.json");
    std::fs::write(&snapshot_path, serde_json::to_string(&snapshot).unwrap()).unwrap();

    let input = temp.path().join("map.json");
    let item = json!({
        "itemId": "map",
        "type": "Web Map",
        "item": {"title": "Hydrants"},
        "data": {"operationalLayers": [{"url": format!("{service}/0")}]}
    });
    std::fs::write(&input, item.to_string()).unwrap();
    let output = temp.path().join("template.json");

    soldeploy(temp.path())
        .arg("templatize")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--portal-file")
        .arg(&snapshot_path)
        .assert()
        .success();

    let template: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(template["dependencies"], json!(["svc"]));
    assert_eq!(template["data"]["operationalLayers"][0]["url"], json!("{{svc.layer0.url}}"));
    assert_eq!(
        template["item"]["url"],
        json!("{{portalBaseUrl}}/home/webmap/viewer.html?webmap={{map.itemId}}")
    );
}

#[test]
fn test_templatize_with_solution_fields() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("map.json");
    let item = json!({
        "itemId": "map",
        "type": "Web Map",
        "data": {"operationalLayers": [{
            "id": "hydrants",
            "url": "{{svc.layer0.url}}",
            "layerDefinition": {"drawingInfo": {"renderer": {"field": "STATUS"}}}
        }]}
    });
    std::fs::write(&input, item.to_string()).unwrap();
    let solution = temp.path().join("solution.json");
    let data = json!({"templates": [{
        "itemId": "svc",
        "type": "Feature Service",
        "properties": {"layers": [{"id": 0, "fields": [{"name": "STATUS"}]}]}
    }]});
    std::fs::write(&solution, data.to_string()).unwrap();
    let snapshot_path = temp.path().join("empty.json");
    std::fs::write(&snapshot_path, serde_json::to_string(&PortalSnapshot::default()).unwrap()).unwrap();

    let output = soldeploy(temp.path())
        .arg("templatize")
        .arg(&input)
        .arg("--solution")
        .arg(&solution)
        .arg("--portal-file")
        .arg(&snapshot_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let template: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(
        template["data"]["operationalLayers"][0]["layerDefinition"]["drawingInfo"]["renderer"]["field"],
        json!("{{svc.layer0.fields.status.name}}")
    );
}
