//! Stats job engine scenarios driven by the in-memory API and virtual clock

use ads_stats_fetcher::fetcher::{ApiResponse, HttpMethod};
use ads_stats_fetcher::stats::config::BATCH_SIZE;
use ads_stats_fetcher::stats::{StatsConfig, StatsError, StatsJobEngine};
use ads_stats_fetcher::{SegmentationType, StatsEntity, TimeWindow};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{ids, job_status, job_submitted, FakeAdsApi, RecordingClock, START_EPOCH};

const JOBS: &str = "/1/stats/jobs/accounts/acc";

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2017, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2017, 4, 30, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn engine(api: &Arc<FakeAdsApi>, clock: &Arc<RecordingClock>) -> StatsJobEngine {
    StatsJobEngine::new(api.clone(), clock.clone(), StatsConfig::default())
}

fn accept(api: &FakeAdsApi, job_id: &str, cost: u64) {
    api.push(HttpMethod::Post, JOBS, job_submitted(job_id, cost));
    api.push(HttpMethod::Get, JOBS, job_status("SUCCESS"));
}

fn cost_exhausted(reset_in_secs: i64) -> ApiResponse {
    ApiResponse::new(429)
        .with_header("x-request-cost", "0")
        .with_header("x-cost-rate-limit-remaining", "0")
        .with_header(
            "x-cost-rate-limit-reset",
            (START_EPOCH + reset_in_secs).to_string(),
        )
}

#[tokio::test]
async fn test_forty_five_ids_make_three_batches() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    for (job, cost) in [("1", 10), ("2", 10), ("3", 4)] {
        accept(&api, job, cost);
    }

    let outcome = engine(&api, &clock)
        .run("acc", StatsEntity::LineItem, &window(), &ids("li", 45), None)
        .await
        .unwrap();

    let sizes: Vec<usize> = api.posts().iter().map(|p| p.entity_ids().len()).collect();
    assert_eq!(sizes, vec![20, 20, 5]);
    assert_eq!(outcome.query_count, 3);
    assert_eq!(outcome.cost_total, 24);
    assert_eq!(api.unused(), 0);
}

#[tokio::test]
async fn test_every_batch_within_limit_and_every_id_submitted() {
    for count in [1usize, 19, 20, 21, 40, 57] {
        let api = FakeAdsApi::new();
        let clock = RecordingClock::new();
        let batches = count.div_ceil(BATCH_SIZE);
        for job in 0..batches {
            accept(&api, &job.to_string(), 1);
        }

        let input = ids("pt", count);
        let outcome = engine(&api, &clock)
            .run("acc", StatsEntity::PromotedTweet, &window(), &input, None)
            .await
            .unwrap();

        let posts = api.posts();
        assert!(posts.iter().all(|p| p.entity_ids().len() <= BATCH_SIZE));
        let submitted: Vec<String> = posts.iter().flat_map(|p| p.entity_ids()).collect();
        assert_eq!(submitted, input, "count {count}");
        assert_eq!(outcome.query_count, batches as u64);
        assert_eq!(outcome.cost_total, batches as u64);
    }
}

#[tokio::test]
async fn test_cost_exhausted_backs_off_then_requeues_at_tail() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(HttpMethod::Post, JOBS, cost_exhausted(30));
    accept(&api, "2", 6);
    accept(&api, "3", 8);

    let input = ids("li", 30);
    let outcome = engine(&api, &clock)
        .run("acc", StatsEntity::LineItem, &window(), &input, None)
        .await
        .unwrap();

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);

    let posts = api.posts();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0].entity_ids(), input[..20].to_vec());
    assert_eq!(posts[1].entity_ids(), input[20..].to_vec());
    assert_eq!(posts[2].entity_ids(), input[..20].to_vec());

    assert_eq!(outcome.query_count, 2);
    assert_eq!(outcome.rate_limited_query_count, 1);
    assert_eq!(outcome.cost_total, 14);
}

#[tokio::test]
async fn test_rate_limit_without_exhausted_budget_does_not_sleep() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(
        HttpMethod::Post,
        JOBS,
        ApiResponse::new(429).with_header("x-cost-rate-limit-remaining", "12"),
    );
    accept(&api, "2", 1);

    let outcome = engine(&api, &clock)
        .run("acc", StatsEntity::LineItem, &window(), &ids("li", 3), None)
        .await
        .unwrap();

    assert!(clock.sleeps().is_empty());
    assert_eq!(outcome.rate_limited_query_count, 1);
    assert_eq!(outcome.query_count, 1);
}

#[tokio::test]
async fn test_requeued_ids_all_eventually_submitted() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    // batch 1 accepted, batch 2 timed out, batch 3 rate limited, then the tail drains
    accept(&api, "1", 3);
    api.push(HttpMethod::Post, JOBS, ApiResponse::new(503));
    api.push(HttpMethod::Post, JOBS, cost_exhausted(10));
    accept(&api, "4", 3);
    accept(&api, "5", 3);

    let input = ids("li", 60);
    let outcome = engine(&api, &clock)
        .run("acc", StatsEntity::LineItem, &window(), &input, None)
        .await
        .unwrap();

    let accepted: HashSet<String> = api
        .posts()
        .iter()
        .enumerate()
        .filter(|(i, _)| ![1, 2].contains(i))
        .flat_map(|(_, p)| p.entity_ids())
        .collect();
    assert_eq!(accepted, input.iter().cloned().collect::<HashSet<_>>());
    assert_eq!(outcome.query_count, 3);
    assert_eq!(outcome.rate_limited_query_count, 1);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
}

#[tokio::test]
async fn test_pending_three_times_waits_three_intervals() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(HttpMethod::Post, JOBS, job_submitted("55", 2));
    for _ in 0..3 {
        api.push(HttpMethod::Get, JOBS, job_status("PENDING"));
    }
    api.push(HttpMethod::Get, JOBS, job_status("SUCCESS"));

    engine(&api, &clock)
        .run("acc", StatsEntity::LineItem, &window(), &ids("li", 4), None)
        .await
        .unwrap();

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(15); 3]);
    let polls: Vec<String> = api
        .requests()
        .into_iter()
        .filter(|r| r.method == HttpMethod::Get)
        .map(|r| r.url)
        .collect();
    assert_eq!(polls.len(), 4);
    assert!(polls.iter().all(|url| url.ends_with("?job_ids=55")));
}

#[tokio::test]
async fn test_custom_poll_interval() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(HttpMethod::Post, JOBS, job_submitted("1", 1));
    api.push(HttpMethod::Get, JOBS, job_status("PROCESSING"));
    api.push(HttpMethod::Get, JOBS, job_status("SUCCESS"));

    let engine = StatsJobEngine::new(
        api.clone(),
        clock.clone(),
        StatsConfig::default().with_poll_interval(Duration::from_secs(2)),
    );
    engine
        .run("acc", StatsEntity::LineItem, &window(), &ids("li", 1), None)
        .await
        .unwrap();

    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_request_parameters() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    accept(&api, "1", 1);

    let engine = StatsJobEngine::new(
        api.clone(),
        clock.clone(),
        StatsConfig::default()
            .with_placement("PUBLISHER_NETWORK")
            .with_metric_groups(vec!["BILLING".to_string()]),
    );
    engine
        .run(
            "acc",
            StatsEntity::PromotedTweet,
            &window(),
            &ids("pt", 2),
            Some(SegmentationType::Locations),
        )
        .await
        .unwrap();

    let post = &api.posts()[0];
    assert_eq!(post.param("entity"), Some("PROMOTED_TWEET"));
    assert_eq!(post.param("granularity"), Some("HOUR"));
    assert_eq!(post.param("start_time"), Some("2017-03-01T00:00:00Z"));
    assert_eq!(post.param("end_time"), Some("2017-04-30T00:00:00Z"));
    assert_eq!(post.param("placement"), Some("PUBLISHER_NETWORK"));
    assert_eq!(post.param("metric_groups"), Some("BILLING"));
    assert_eq!(post.param("entity_ids"), Some("pt0,pt1"));
    assert_eq!(post.param("segmentation_type"), Some("LOCATIONS"));
}

#[tokio::test]
async fn test_forbidden_submission_is_fatal() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(HttpMethod::Post, JOBS, ApiResponse::new(403));

    let err = engine(&api, &clock)
        .run("acc", StatsEntity::LineItem, &window(), &ids("li", 25), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StatsError::UnexpectedStatus {
            status: 403,
            operation: "submit",
            ..
        }
    ));
    assert_eq!(api.posts().len(), 1);
}

#[tokio::test]
async fn test_malformed_job_response_is_fatal() {
    let api = FakeAdsApi::new();
    let clock = RecordingClock::new();
    api.push(HttpMethod::Post, JOBS, ApiResponse::new(200));

    let err = engine(&api, &clock)
        .run("acc", StatsEntity::LineItem, &window(), &ids("li", 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StatsError::Fetcher(_)));
}
