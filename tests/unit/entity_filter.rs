//! Entity filter properties over realistic listing records

use ads_stats_fetcher::filter::{filter_entities, is_active, FilterError, ParentFilter};
use ads_stats_fetcher::{EntityRecord, ParentField, TimeWindow};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2017, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2017, 4, 30, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn live(id: &str) -> EntityRecord {
    EntityRecord {
        start_time: Some("2017-01-01T00:00:00Z".to_string()),
        updated_at: Some("2017-03-10T12:00:00Z".to_string()),
        ..EntityRecord::new(id)
    }
}

fn stale_deleted(id: &str) -> EntityRecord {
    EntityRecord {
        deleted: true,
        updated_at: Some("2017-02-01T00:00:00Z".to_string()),
        ..live(id)
    }
}

#[test]
fn test_stale_deleted_records_dropped_in_order() {
    // 25 records, every record whose index is 1 mod 5 or 3 mod 5 was deleted before the window
    let records: Vec<EntityRecord> = (0..25)
        .map(|i| {
            let id = format!("li{i:02}");
            if i % 5 == 1 || i % 5 == 3 {
                stale_deleted(&id)
            } else {
                live(&id)
            }
        })
        .collect();

    let survivors = filter_entities(&records, &window(), None).unwrap();

    assert_eq!(survivors.len(), 15);
    let expected: Vec<String> = (0..25)
        .filter(|i| i % 5 != 1 && i % 5 != 3)
        .map(|i| format!("li{i:02}"))
        .collect();
    assert_eq!(survivors, expected);
}

#[test]
fn test_window_bounds() {
    let window = window();

    let ended_before = EntityRecord {
        end_time: Some("2017-02-28T23:00:00Z".to_string()),
        ..live("a")
    };
    let starts_after = EntityRecord {
        start_time: Some("2017-05-01T00:00:00Z".to_string()),
        ..live("b")
    };
    let ends_at_start = EntityRecord {
        end_time: Some("2017-03-01T00:00:00Z".to_string()),
        ..live("c")
    };
    let starts_at_end = EntityRecord {
        start_time: Some("2017-04-30T00:00:00Z".to_string()),
        ..live("d")
    };

    assert!(!is_active(&ended_before, &window, None).unwrap());
    assert!(!is_active(&starts_after, &window, None).unwrap());
    assert!(is_active(&ends_at_start, &window, None).unwrap());
    assert!(is_active(&starts_at_end, &window, None).unwrap());
}

#[test]
fn test_deleted_or_paused_during_window_kept() {
    let deleted_late = EntityRecord {
        deleted: true,
        ..live("a")
    };
    let paused_late = EntityRecord {
        paused: true,
        ..live("b")
    };
    let paused_early = EntityRecord {
        paused: true,
        updated_at: Some("2017-01-20T00:00:00Z".to_string()),
        ..live("c")
    };

    let survivors =
        filter_entities(&[deleted_late, paused_late, paused_early], &window(), None).unwrap();
    assert_eq!(survivors, vec!["a", "b"]);
}

#[test]
fn test_parent_filter_stable_on_survivors() {
    let allowed: HashSet<String> = ["c1", "c2"].iter().map(|s| s.to_string()).collect();
    let records: Vec<EntityRecord> = [("l1", "c1"), ("l2", "c3"), ("l3", "c2"), ("l4", "c9")]
        .iter()
        .map(|(id, campaign)| EntityRecord {
            campaign_id: Some(campaign.to_string()),
            ..live(id)
        })
        .collect();

    let parent = ParentFilter::new(ParentField::CampaignId, &allowed);
    let once = filter_entities(&records, &window(), Some(parent)).unwrap();
    assert_eq!(once, vec!["l1", "l3"]);

    let survivors: Vec<EntityRecord> = records
        .into_iter()
        .filter(|record| once.contains(&record.id))
        .collect();
    let twice = filter_entities(&survivors, &window(), Some(parent)).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_all_observed_parents_same_as_no_parent_filter() {
    let records: Vec<EntityRecord> = (0..12)
        .map(|i| {
            let id = format!("pt{i:02}");
            let base = if i % 3 == 0 { stale_deleted(&id) } else { live(&id) };
            EntityRecord {
                line_item_id: Some(format!("li{}", i % 4)),
                ..base
            }
        })
        .collect();
    let observed: HashSet<String> = records
        .iter()
        .filter_map(|record| record.line_item_id.clone())
        .collect();

    let unconstrained = filter_entities(&records, &window(), None).unwrap();
    let parent = ParentFilter::new(ParentField::LineItemId, &observed);
    let constrained = filter_entities(&records, &window(), Some(parent)).unwrap();

    assert_eq!(unconstrained.len(), 8);
    assert_eq!(constrained, unconstrained);
}

#[test]
fn test_missing_parent_reference_dropped() {
    let allowed: HashSet<String> = ["f1".to_string()].into_iter().collect();
    let orphan = live("c1");
    let parent = ParentFilter::new(ParentField::FundingInstrumentId, &allowed);
    assert!(filter_entities(&[orphan], &window(), Some(parent))
        .unwrap()
        .is_empty());
}

#[test]
fn test_malformed_timestamp_is_error() {
    let broken = EntityRecord {
        end_time: Some("30/04/2017".to_string()),
        ..live("x")
    };
    let err = filter_entities(&[live("ok"), broken], &window(), None).unwrap_err();
    assert!(matches!(
        err,
        FilterError::MalformedTimestamp { ref id, field: "end_time", .. } if id == "x"
    ));
}
