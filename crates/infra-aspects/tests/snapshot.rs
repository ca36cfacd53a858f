//! Snapshot tests
//!
//! Loads the declarations and the aspect configuration in /tests/fixtures/shop/ and compares
//! the rendered report.
use infra_aspects::config::AspectConfig;
use infra_aspects::engine::DiagnosticsReport;
use infra_aspects::hcl_documents::HclDocuments;
use infra_aspects::resource_tree::ResourceTree;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/shop")
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("INFRA_ASPECTS_LOG"))
        .with_test_writer()
        .try_init();
}

fn tree(root_id: &str) -> ResourceTree {
    let mut documents = HclDocuments::default();
    documents
        .load_directory(&fixture())
        .expect("fixture must load");

    infra_aspects::declarations::build_tree(&documents, root_id).expect("valid declarations")
}

fn config() -> AspectConfig {
    AspectConfig::load(&fixture().join("aspects.hcl")).expect("valid configuration")
}

fn check(root_id: &str, strict: bool) -> DiagnosticsReport {
    init_logging();

    let config = config();
    let policies = config.policies().expect("unique policies");
    infra_aspects::engine::run(&tree(root_id), &policies, &config.suppressions, strict)
        .expect("no policy defect")
}

#[test]
fn tree_shape() {
    let tree = tree("root");
    let rendered: Vec<String> = tree
        .iter()
        .map(|node| {
            let tags: Vec<_> = node.tags().keys().map(String::as_str).collect();
            format!("{} {} [{}]", node.path(), node.resource_type(), tags.join(","))
        })
        .collect();

    insta::assert_snapshot!(rendered.join("\n"), @r###"
    /root app []
    /root/frontend load-balancer [Owner,Purpose,Project]
    /root/frontend/cert-helper custom-resource-provider []
    /root/build-info metadata []
    /root/assets storage-bucket [Owner,Purpose,Project]
    /root/assets/bucket-name deployment-output []
    /root/legacy-uploads storage-bucket [Owner,Project]
    "###);
}

#[test]
fn lenient() {
    let report = check("root", false);

    insta::assert_snapshot!(infra_aspects::render::text(&report, false).trim_end(), @r###"
    warning[weak-tls-policy] /root/frontend (load-balancer): load balancer allows outdated TLS versions
    error[encryption-at-rest-missing] /root/legacy-uploads (storage-bucket): data must be encrypted at rest

    1 error(s), 1 warning(s), 2 suppressed
    result: failed
    "###);
}

#[test]
fn strict_and_verbose() {
    let report = check("root", true);

    insta::assert_snapshot!(infra_aspects::render::text(&report, true).trim_end(), @r###"
    error[weak-tls-policy] /root/frontend (load-balancer): load balancer allows outdated TLS versions
    error[encryption-at-rest-missing] /root/legacy-uploads (storage-bucket): data must be encrypted at rest
    suppressed[missing-documentation-tag] /root/legacy-uploads (path): bucket is scheduled for deletion
    suppressed[bucket-versioning-disabled] /root/legacy-uploads (global): versioning is handled by the backup service

    2 error(s), 0 warning(s), 2 suppressed
    result: failed
    "###);
}

#[test]
fn suppression_paths_do_not_follow_a_renamed_root() {
    let report = check("shop", false);

    let visible: Vec<_> = report
        .violations
        .iter()
        .map(|v| (v.rule_id.as_str(), v.path.as_str()))
        .collect();
    assert_eq!(
        visible,
        vec![
            ("weak-tls-policy", "/shop/frontend"),
            ("missing-documentation-tag", "/shop/legacy-uploads"),
            ("encryption-at-rest-missing", "/shop/legacy-uploads"),
        ]
    );
    assert_eq!(report.suppressed_count, 1);
}

#[test]
fn json_report() {
    let report = check("root", false);
    let json = serde_json::to_value(&report).expect("serializable");

    assert_eq!(json["passed"], serde_json::json!(false));
    assert_eq!(json["suppressed_count"], serde_json::json!(2));
    assert_eq!(
        json["violations"][1],
        serde_json::json!({
            "rule_id": "encryption-at-rest-missing",
            "path": "/root/legacy-uploads",
            "resource_type": "storage-bucket",
            "severity": "error",
            "message": "data must be encrypted at rest",
        })
    );
    assert_eq!(
        json["suppressions"][1],
        serde_json::json!({
            "rule_id": "bucket-versioning-disabled",
            "path": "/root/legacy-uploads",
            "scope": "global",
            "reason": "versioning is handled by the backup service",
        })
    );
}
