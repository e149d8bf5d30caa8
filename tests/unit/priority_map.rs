//! Environment assembled from several sources must not depend on the order
//! in which the sources write.

use k8s_openapi::api::core::v1::EnvVar;

use dynakube_operator::kubeobjects::prioritymap::{DuplicatePolicy, Priority, PriorityMap};

type Source = fn(&mut PriorityMap);

fn baseline(map: &mut PriorityMap) {
    map.insert("DT_ID_SEED_NAMESPACE", "dynatrace", Priority::Default);
    map.insert("DT_CAPABILITIES", "MSGrouter", Priority::Default);
    map.insert("DT_DEPLOYMENT_METADATA", "orchestration_tech=Operator", Priority::Default);
}

fn modifier(map: &mut PriorityMap) {
    map.insert("DT_HTTP_PORT", "9998", Priority::Medium);
    map.insert("DT_CAPABILITIES", "MSGrouter,metrics_ingest", Priority::Medium);
}

fn user(map: &mut PriorityMap) {
    map.extend_env(
        &[
            EnvVar {
                name: "DT_HTTP_PORT".to_string(),
                value: Some("8080".to_string()),
                value_from: None,
            },
            EnvVar {
                name: "EXTRA".to_string(),
                value: Some("1".to_string()),
                value_from: None,
            },
        ],
        Priority::High,
    );
}

fn permutations() -> Vec<[Source; 3]> {
    let (a, b, c): (Source, Source, Source) = (baseline, modifier, user);
    vec![[a, b, c], [a, c, b], [b, a, c], [b, c, a], [c, a, b], [c, b, a]]
}

#[test]
fn test_every_write_order_yields_the_same_env() {
    let rendered: Vec<Vec<EnvVar>> = permutations()
        .into_iter()
        .map(|order| {
            let mut map = PriorityMap::new();
            for source in order {
                source(&mut map);
            }
            map.as_env_vars()
        })
        .collect();

    for env in &rendered[1..] {
        assert_eq!(env, &rendered[0]);
    }
}

#[test]
fn test_highest_priority_wins() {
    let mut map = PriorityMap::new();
    user(&mut map);
    modifier(&mut map);
    baseline(&mut map);

    assert_eq!(map.get("DT_HTTP_PORT"), Some("8080"));
    assert_eq!(map.get("DT_CAPABILITIES"), Some("MSGrouter,metrics_ingest"));
    assert_eq!(map.get("DT_ID_SEED_NAMESPACE"), Some("dynatrace"));
    assert_eq!(map.len(), 5);
    let names: Vec<String> = map.as_env_vars().into_iter().map(|e| e.name).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn test_repeatable_args_are_sorted_regardless_of_order() {
    let render = |values: &[&str]| {
        let mut map = PriorityMap::with_policy(DuplicatePolicy::AllowAll).with_separator("=");
        for value in values {
            map.insert("--set-host-property", *value, Priority::Default);
        }
        map.as_key_values()
    };

    let forward = render(&["a=1", "b=2", "c=3"]);
    let backward = render(&["c=3", "b=2", "a=1"]);
    assert_eq!(forward, backward);
    assert_eq!(forward[0], "--set-host-property=a=1");
}
