//! Version parsing and ordering as used by the downgrade check.

use dynakube_operator::version::{from_image, Version};

fn parse(s: &str) -> Version {
    s.parse().unwrap()
}

#[test]
fn test_sorting_is_numeric_per_component() {
    let mut versions = vec![
        parse("1.203.1.20210908-220956"),
        parse("1.30.0.20200101-000000"),
        parse("1.203.0.20210908-220956"),
        parse("2.0.0.20190101-000000"),
        parse("1.203.1.20210908"),
    ];
    versions.sort();
    let rendered: Vec<String> = versions.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "1.30.0.20200101-000000",
            "1.203.0.20210908-220956",
            "1.203.1.20210908",
            "1.203.1.20210908-220956",
            "2.0.0.20190101-000000",
        ]
    );
}

#[test]
fn test_same_version_is_not_a_downgrade() {
    let v = parse("1.290.0.20240101-000000");
    assert!(!v.is_downgrade_to(&v.clone()));
}

#[test]
fn test_image_tags() {
    assert_eq!(
        from_image("registry.example.com:5000/dynatrace/activegate:1.290.0.20240101-000000"),
        Some(parse("1.290.0.20240101-000000"))
    );
    assert_eq!(from_image("registry.example.com:5000/dynatrace/activegate"), None);
    assert_eq!(from_image("abc.live.dynatrace.com/linux/activegate:latest"), None);
}

#[test]
fn test_malformed_versions_are_rejected() {
    for input in ["", "1.2.3", "1.2.3.x", "v1.2.3.4", "1.2.3.4-"] {
        assert!(input.parse::<Version>().is_err(), "{input}");
    }
}
