//! Random acyclic Solutions deploy in dependency order.

use proptest::prelude::*;
use solution_deployer::core::ItemTemplate;
use solution_deployer::deployer::{DeployOptions, deploy_solution};
use solution_deployer::portal::PortalEvent;
use solution_deployer::resolver::DependencyGraph;
use solution_deployer::test_utils::{SolutionFixture, recording_progress, template};

/// Templates where item `i` may depend on any item `j < i`, listed in reverse so
/// declaration order never matches creation order by accident.
fn random_dag() -> impl Strategy<Value = Vec<ItemTemplate>> {
    (1usize..10)
        .prop_flat_map(|n| {
            let edges = proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n);
            let costs = proptest::collection::vec(1u8..20, n);
            (Just(n), edges, costs)
        })
        .prop_map(|(n, edges, costs)| {
            let mut templates: Vec<ItemTemplate> = (0..n)
                .map(|i| {
                    let deps: Vec<String> =
                        (0..i).filter(|&j| edges[i][j]).map(|j| format!("item{j}")).collect();
                    let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                    let mut item = template(&format!("item{i}"), "Web Map", &deps);
                    item.estimated_cost = f64::from(costs[i]);
                    item
                })
                .collect();
            templates.reverse();
            templates
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: creation waves place every item after all of its dependencies.
    #[test]
    fn property_waves_respect_dependencies(templates in random_dag()) {
        let graph = DependencyGraph::from_templates(&templates).unwrap();
        let waves = graph.creation_waves().unwrap();
        let wave_of = |id: &str| waves.iter().position(|wave| wave.iter().any(|w| w == id)).unwrap();

        prop_assert_eq!(waves.iter().map(Vec::len).sum::<usize>(), templates.len());
        for template in &templates {
            for dep in &template.dependencies {
                prop_assert!(wave_of(dep) < wave_of(&template.item_id));
            }
        }
    }

    /// PROPERTY: a deployment creates every item once, after its dependencies, and
    /// reports monotonic progress ending at 100.
    #[test]
    fn property_deployment_order_and_progress(
        templates in random_dag(),
        max_concurrency in 1usize..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let mut fixture = SolutionFixture::new("sol", "Random");
        for template in &templates {
            fixture = fixture.with_template(template.clone());
        }
        let portal = fixture.build();
        let (callback, values) = recording_progress();
        let options = DeployOptions {
            progress_callback: Some(callback),
            max_concurrency,
            ..DeployOptions::default()
        };

        let deployed = runtime.block_on(deploy_solution(&portal, "sol", options)).unwrap();
        prop_assert_eq!(deployed.id_map.len(), templates.len());

        let created: Vec<String> = portal
            .events()
            .into_iter()
            .filter_map(|event| match event {
                PortalEvent::ItemCreated { title, .. } if title != "Random" => Some(title),
                _ => None,
            })
            .collect();
        prop_assert_eq!(created.len(), templates.len());
        let position = |id: &str| created.iter().position(|c| c == id).unwrap();
        for template in &templates {
            for dep in &template.dependencies {
                prop_assert!(position(dep) < position(&template.item_id));
            }
        }

        let values = values.lock().unwrap().clone();
        prop_assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
        prop_assert_eq!(values.last().copied(), Some(100.0));
        // Items share 95 points between the solution item (3) and completion.
        let after_items = values[values.len() - 2];
        prop_assert!((after_items - 98.0).abs() < 1e-6, "{:?}", values);
    }
}
