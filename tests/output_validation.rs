//! Output Validation Tests
//!
//! Validates the JSON written to stdout for a run:
//! - Envelope fields and counters
//! - Per-target outcomes tagged by `status`
//! - Failure records carry code, category and message, and `detail` only in strict mode
//! - No credentials leak into output

mod common;

use common::FakeCluster;
use pretty_assertions::assert_eq;
use serde_json::Value;

use repl_article::{
    add_article, ArticleRequest, Credential, PublicationKind, ReportingMode, RunEnvelope,
    RunOptions, Target,
};

// ============================================================================
// Helpers
// ============================================================================

async fn run_json(cluster: &FakeCluster, targets: &[Target], options: RunOptions) -> Value {
    let request = ArticleRequest::new("pubs", "testPub", "publishers").with_filter("city = 'seattle'");
    let outcomes = add_article(cluster, targets, &request, options).await;
    let envelope = RunEnvelope::new("add-article", outcomes, 7);

    let json_str = serde_json::to_string(&envelope).expect("Should serialize");
    serde_json::from_str(&json_str).expect("Should be valid JSON")
}

fn two_servers() -> FakeCluster {
    FakeCluster::new()
        .with_publication("srv1", "pubs", "testPub", PublicationKind::Transactional)
        .with_publication("srv2", "pubs", "otherPub", PublicationKind::Merge)
}

// ============================================================================
// Envelope Structure
// ============================================================================

#[tokio::test]
async fn test_run_envelope_structure() {
    let json = run_json(&two_servers(), &[Target::new("srv1", None)], RunOptions::default()).await;

    assert_eq!(json["ok"], true);
    assert_eq!(json["command"], "add-article");
    assert!(json["results"].is_array());
    assert_eq!(json["meta"]["execution_ms"], 7);
    assert_eq!(json["meta"]["targets"], 1);
    assert_eq!(json["meta"]["succeeded"], 1);
    assert_eq!(json["meta"]["failed"], 0);
    assert_eq!(json["meta"]["simulated"], 0);
}

#[tokio::test]
async fn test_created_outcome_structure() {
    let json = run_json(&two_servers(), &[Target::new("srv1", None)], RunOptions::default()).await;
    let result = &json["results"][0];

    assert_eq!(result["status"], "created");
    assert_eq!(result["instance"], "srv1");
    assert_eq!(result["refreshed"], true);
    assert_eq!(result["article"]["name"], "publishers");
    assert_eq!(result["article"]["kind"], "log_based");
    assert_eq!(result["article"]["filter_clause"], "city = 'seattle'");
    assert!(result["article"].get("creation_options").is_none());
}

#[tokio::test]
async fn test_failed_outcome_structure() {
    let targets = [Target::new("srv1", None), Target::new("srv2", None)];
    let json = run_json(&two_servers(), &targets, RunOptions::default()).await;

    assert_eq!(json["ok"], false);
    assert_eq!(json["meta"]["succeeded"], 1);
    assert_eq!(json["meta"]["failed"], 1);

    let failed = &json["results"][1];
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["instance"], "srv2");
    assert_eq!(failed["failure"]["code"], "LOOKUP_ERROR");
    assert_eq!(failed["failure"]["category"], "lookup");
    assert!(failed["failure"]["message"].as_str().unwrap().contains("srv2"));
    assert!(failed["failure"].get("detail").is_none());
}

#[tokio::test]
async fn test_strict_failure_has_detail() {
    let options = RunOptions { simulate: false, reporting: ReportingMode::Strict };
    let json = run_json(&two_servers(), &[Target::new("srv2", None)], options).await;

    let detail = json["results"][0]["failure"]["detail"].as_str().unwrap();
    assert!(detail.starts_with("Lookup error:"));
}

#[tokio::test]
async fn test_simulated_outcome_structure() {
    let options = RunOptions { simulate: true, reporting: ReportingMode::Friendly };
    let json = run_json(&two_servers(), &[Target::new("srv1", None)], options).await;

    assert_eq!(json["ok"], true);
    assert_eq!(json["meta"]["simulated"], 1);

    let result = &json["results"][0];
    assert_eq!(result["status"], "simulated");
    assert_eq!(result["plan"]["would_refresh"], true);
    assert_eq!(result["plan"]["article"]["exists"], false);
    assert!(!result["plan"]["actions"].as_array().unwrap().is_empty());
}

// ============================================================================
// Credential Handling
// ============================================================================

#[tokio::test]
async fn test_password_never_in_output() {
    let credential = Credential::new("repl_admin", "s3cret-Pa55");
    let targets = [Target::new("srv1", Some(credential.clone())), Target::new("nowhere", Some(credential))];
    let json = run_json(&two_servers(), &targets, RunOptions { simulate: false, reporting: ReportingMode::Strict }).await;

    let rendered = json.to_string();
    assert!(!rendered.contains("s3cret-Pa55"));
    assert_eq!(json["results"][1]["failure"]["category"], "connection");
}
