//! Full account runs against the in-memory API

use ads_stats_fetcher::fetcher::{ApiResponse, FetcherError, HttpMethod};
use ads_stats_fetcher::run::{RunError, RunOptions, StatsRun};
use ads_stats_fetcher::stats::StatsConfig;
use ads_stats_fetcher::{EntityKind, TimeWindow, Verbosity};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::support::{child_record, job_status, job_submitted, live_record, page, FakeAdsApi, RecordingClock};

const ACCOUNT: &str = "/1/accounts/acc";
const JOBS: &str = "/1/stats/jobs/accounts/acc";

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2017, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2017, 4, 30, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn listing(kind: EntityKind) -> String {
    format!("{ACCOUNT}/{}", kind.resource())
}

fn stats_run(api: &Arc<FakeAdsApi>, clock: &Arc<RecordingClock>) -> StatsRun {
    StatsRun::new(api.clone(), clock.clone(), StatsConfig::default())
}

fn ended_before_window(id: &str, parent_field: &str, parent_id: &str) -> Value {
    let mut record = child_record(id, parent_field, parent_id);
    record["end_time"] = json!("2017-01-31T00:00:00Z");
    record
}

/// Account with one live branch per tier plus filtered-out siblings
fn seed_hierarchy(api: &FakeAdsApi) {
    api.push(
        HttpMethod::Get,
        ACCOUNT,
        ApiResponse::new(200).with_body(json!({"data": {"id": "acc", "name": "Test"}})),
    );
    api.push(
        HttpMethod::Get,
        &listing(EntityKind::FundingInstruments),
        page(vec![live_record("f1"), live_record("f2")], None),
    );
    api.push(
        HttpMethod::Get,
        &listing(EntityKind::Campaigns),
        page(
            vec![
                child_record("c1", "funding_instrument_id", "f1"),
                ended_before_window("c2", "funding_instrument_id", "f2"),
            ],
            Some("more"),
        ),
    );
    api.push(
        HttpMethod::Get,
        &listing(EntityKind::Campaigns),
        page(vec![child_record("c3", "funding_instrument_id", "f9")], None),
    );
    api.push(
        HttpMethod::Get,
        &listing(EntityKind::LineItems),
        page(
            vec![
                child_record("l1", "campaign_id", "c1"),
                child_record("l2", "campaign_id", "c2"),
                child_record("l3", "campaign_id", "c1"),
            ],
            None,
        ),
    );
    api.push(
        HttpMethod::Get,
        &listing(EntityKind::PromotedTweets),
        page(
            vec![
                child_record("p1", "line_item_id", "l1"),
                child_record("p2", "line_item_id", "l2"),
            ],
            None,
        ),
    );
}

#[tokio::test]
async fn test_hierarchy_filtered_and_stats_submitted() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    seed_hierarchy(&api);
    api.push(HttpMethod::Post, JOBS, job_submitted("1", 40));
    api.push(HttpMethod::Get, JOBS, job_status("SUCCESS"));
    api.push(HttpMethod::Post, JOBS, job_submitted("2", 20));
    api.push(HttpMethod::Get, JOBS, job_status("SUCCESS"));

    let report = stats_run(&api, &clock)
        .execute(&RunOptions::new("acc", window()))
        .await
        .unwrap();

    let counts: Vec<(EntityKind, usize, usize)> = report
        .tiers
        .iter()
        .map(|t| (t.kind, t.fetched, t.active))
        .collect();
    assert_eq!(
        counts,
        vec![
            (EntityKind::FundingInstruments, 2, 2),
            (EntityKind::Campaigns, 3, 1),
            (EntityKind::LineItems, 3, 2),
            (EntityKind::PromotedTweets, 2, 1),
        ]
    );

    let posts = api.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].param("entity"), Some("LINE_ITEM"));
    assert_eq!(posts[0].entity_ids(), vec!["l1", "l3"]);
    assert_eq!(posts[1].param("entity"), Some("PROMOTED_TWEET"));
    assert_eq!(posts[1].entity_ids(), vec!["p1"]);

    assert_eq!(report.totals.query_count, 2);
    assert_eq!(report.totals.request_cost, 60);
    assert_eq!(report.totals.segmented_request_cost, 0);
    assert_eq!(api.unused(), 0);
}

#[tokio::test]
async fn test_segmentation_runs_every_type_per_group() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    seed_hierarchy(&api);
    // 2 unsegmented + 2 groups x 5 segmentation types
    for job in 0..12 {
        api.push(HttpMethod::Post, JOBS, job_submitted(&job.to_string(), 5));
        api.push(HttpMethod::Get, JOBS, job_status("SUCCESS"));
    }

    let report = stats_run(&api, &clock)
        .execute(&RunOptions::new("acc", window()).with_segmentation(true))
        .await
        .unwrap();

    let segmentations: Vec<Option<String>> = api
        .posts()
        .iter()
        .map(|p| p.param("segmentation_type").map(str::to_string))
        .collect();
    assert_eq!(segmentations.len(), 12);
    assert!(segmentations[..2].iter().all(Option::is_none));
    assert_eq!(
        segmentations[2..7]
            .iter()
            .map(|s| s.as_deref().unwrap())
            .collect::<Vec<_>>(),
        vec!["PLATFORMS", "LOCATIONS", "GENDER", "INTERESTS", "KEYWORDS"]
    );

    let totals = report.totals;
    assert_eq!(totals.query_count, 12);
    assert_eq!(totals.request_cost, 60);
    assert_eq!(totals.segmented_query_count, 10);
    assert_eq!(totals.segmented_request_cost, 50);
    assert_eq!(totals.unsegmented_request_cost(), 10);

    let summary = report.render(Verbosity::Verbose);
    assert!(summary.contains("Segmented Stats Req Cost:\t50"));
    assert!(summary.contains("Avg Cost per Query:\t\t5.00"));
}

#[tokio::test]
async fn test_no_active_entities_submits_nothing() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(
        HttpMethod::Get,
        ACCOUNT,
        ApiResponse::new(200).with_body(json!({"data": {"id": "acc"}})),
    );
    for kind in EntityKind::HIERARCHY {
        api.push(HttpMethod::Get, &listing(kind), page(vec![], None));
    }

    let report = stats_run(&api, &clock)
        .execute(&RunOptions::new("acc", window()).with_segmentation(true))
        .await
        .unwrap();

    assert!(api.posts().is_empty());
    assert_eq!(report.totals.query_count, 0);
    assert!(!report.render(Verbosity::Verbose).contains("Avg Cost"));
}

#[tokio::test]
async fn test_missing_account_data() {
    for body in [json!({"data": null}), json!({"data": []}), json!({})] {
        let api = FakeAdsApi::new();
        let clock = RecordingClock::new();
        api.push(HttpMethod::Get, ACCOUNT, ApiResponse::new(200).with_body(body));

        let err = stats_run(&api, &clock)
            .execute(&RunOptions::new("acc", window()))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::AccountNotFound(ref id) if id == "acc"));
        assert_eq!(api.requests().len(), 1);
    }
}

#[tokio::test]
async fn test_account_lookup_failure_is_fatal() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(
        HttpMethod::Get,
        ACCOUNT,
        ApiResponse::new(404).with_body(json!({"errors": [{"code": "NOT_FOUND"}]})),
    );

    let err = stats_run(&api, &clock)
        .execute(&RunOptions::new("acc", window()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Fetcher(FetcherError::UnexpectedStatus { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(
        HttpMethod::Get,
        ACCOUNT,
        ApiResponse::new(200).with_body(json!({"data": {"id": "acc"}})),
    );
    api.push(
        HttpMethod::Get,
        &listing(EntityKind::FundingInstruments),
        ApiResponse::new(500),
    );

    let err = stats_run(&api, &clock)
        .execute(&RunOptions::new("acc", window()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Fetcher(FetcherError::UnexpectedStatus { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_malformed_record_is_fatal() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    let mut broken = live_record("f1");
    broken["start_time"] = json!("yesterday");
    api.push(
        HttpMethod::Get,
        ACCOUNT,
        ApiResponse::new(200).with_body(json!({"data": {"id": "acc"}})),
    );
    api.push(
        HttpMethod::Get,
        &listing(EntityKind::FundingInstruments),
        page(vec![broken], None),
    );

    let err = stats_run(&api, &clock)
        .execute(&RunOptions::new("acc", window()))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Filter(_)));
}
