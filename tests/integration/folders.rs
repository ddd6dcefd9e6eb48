//! Destination folder naming.

use solution_deployer::deployer::{DeployOptions, deploy_solution};
use solution_deployer::portal::PortalEvent;
use solution_deployer::test_utils::{SolutionFixture, template};

fn folder_titles(events: &[PortalEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PortalEvent::FolderCreated { title } => Some(title.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_repeated_deployments_get_numbered_folders() {
    let portal = SolutionFixture::new("sol", "Foo")
        .with_template(template("a", "Web Map", &[]))
        .build();

    for _ in 0..3 {
        deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();
    }

    assert_eq!(folder_titles(&portal.events()), vec!["Foo", "Foo 1", "Foo 2"]);
    let snapshot = portal.snapshot();
    let titles: Vec<_> = snapshot.folders.iter().map(|f| f.title.as_str()).collect();
    assert_eq!(titles, vec!["Foo", "Foo 1", "Foo 2"]);
}

#[tokio::test]
async fn test_existing_folders_are_skipped() {
    let portal = SolutionFixture::new("sol", "Foo")
        .with_folder("Foo")
        .with_folder("Foo 1")
        .with_folder("Foo 3")
        .build();

    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();
    assert_eq!(folder_titles(&portal.events()), vec!["Foo 2"]);

    // The solution item lives in the new folder.
    let snapshot = portal.snapshot();
    let folder = snapshot.folders.iter().find(|f| f.title == "Foo 2").unwrap();
    let stored = portal.item(deployed.item.id.as_deref().unwrap()).unwrap();
    assert_eq!(stored.folder_id.as_deref(), Some(folder.id.as_str()));
}

#[tokio::test]
async fn test_items_share_the_solution_folder() {
    let portal = SolutionFixture::new("sol", "Foo")
        .with_template(template("a", "Web Map", &[]))
        .with_template(template("b", "Web Map", &["a"]))
        .build();

    let deployed = deploy_solution(&portal, "sol", DeployOptions::default()).await.unwrap();
    let solution_folder = portal.item(deployed.item.id.as_deref().unwrap()).unwrap().folder_id;
    assert!(solution_folder.is_some());
    for id in deployed.id_map.values() {
        assert_eq!(portal.item(id).unwrap().folder_id, solution_folder);
    }
}
