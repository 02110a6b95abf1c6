//! Integration tests that invoke the real validator CLI.
//!
//! These tests are `#[ignore]` by default. They need the `claude` CLI on PATH
//! with working credentials.
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p gatekeeper-opinions --test cli_integration -- --ignored
//! ```

use std::time::Duration;

use gatekeeper_opinions::claude_cli::{check_cli_available, invoke_cli, CliConfig};
use gatekeeper_opinions::parser::extract_json;
use gatekeeper_opinions::test_support::sample_context;
use gatekeeper_opinions::{CliOpinionSource, OpinionSource};

fn live_config() -> CliConfig {
    CliConfig {
        timeout: Duration::from_secs(60),
        ..CliConfig::default()
    }
}

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(check_cli_available("claude").await, "claude CLI not found on PATH");
}

#[tokio::test]
#[ignore]
async fn cli_output_is_parseable_json() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let system_prompt = "Respond ONLY with a JSON object {\"status\": \"ok\", \"echo\": <the user's message>}.";
    let raw = invoke_cli(system_prompt, "gatekeeper", &live_config())
        .await
        .expect("CLI invocation failed");
    let json = extract_json(&raw).expect("no JSON in CLI output");
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
#[ignore]
async fn risk_validator_returns_in_range_opinion() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let source = CliOpinionSource::new(
        "risk".to_string(),
        "risk".to_string(),
        CliConfig::default().model,
        Duration::from_secs(60),
    );
    let opinion = source
        .review(&sample_context("BTC-USD"))
        .await
        .expect("risk validator failed");
    assert_eq!(opinion.source, "risk");
    assert!((0.0..=100.0).contains(&opinion.confidence));
    assert!((0.0..=10.0).contains(&opinion.risk_score));
}
