use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use vitals_keeper::{
    error::SystemError, MetricSample, PipelineConfig, QueryService, RetentionManager,
    RetentionPolicy, RingStore, SampleStore, SqliteStore, WebConfig,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Both backends, so every property below is checked against each.
fn stores() -> (tempfile::TempDir, Vec<Arc<dyn SampleStore>>) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let sqlite = SqliteStore::open(dir.path().join("vitals.db"), Duration::from_secs(5))
        .expect("Should open SQLite store");
    let stores: Vec<Arc<dyn SampleStore>> = vec![Arc::new(sqlite), Arc::new(RingStore::new(1000))];
    (dir, stores)
}

/// Insert t=0,1,2 with cpu 10,20,30: latest is t=2, range(t=1) is t=1 and t=2
#[tokio::test]
async fn test_latest_and_range_scenario() {
    let (_dir, stores) = stores();
    for store in stores {
        for (secs, cpu) in [(0, 10.0), (1, 20.0), (2, 30.0)] {
            store
                .insert(MetricSample::new(at(secs)).with_cpu(cpu))
                .await
                .expect("Should insert");
        }

        let latest = store.latest().await.unwrap().expect("Store should not be empty");
        assert_eq!(latest.timestamp, at(2), "{:?}", store.policy());
        assert_eq!(latest.cpu_percent, Some(30.0));

        let window = store.range(at(1), 10).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].timestamp, at(1));
        assert_eq!(window[0].cpu_percent, Some(20.0));
        assert_eq!(window[1].timestamp, at(2));
    }
}

/// An absent temperature comes back absent, not as 0
#[tokio::test]
async fn test_absent_temperature_scenario() {
    let (_dir, stores) = stores();
    for store in stores {
        let sample = MetricSample::new(at(100))
            .with_cpu(5.0)
            .with_memory(40.0)
            .with_disk(70.0);
        store.insert(sample).await.unwrap();

        let rows = store.range(at(0), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature_celsius, None);
        assert_eq!(rows[0].disk_percent, Some(70.0));
    }
}

/// Horizon 30 days: a 31-day-old sample is pruned, a current one remains
#[tokio::test]
async fn test_horizon_scenario() {
    let (_dir, stores) = stores();
    let now = Utc::now();
    for store in stores {
        store
            .insert(MetricSample::new(now - chrono::Duration::days(31)))
            .await
            .unwrap();
        store.insert(MetricSample::new(now)).await.unwrap();

        let manager =
            RetentionManager::new(Arc::clone(&store), Duration::from_secs(30 * 24 * 3600)).unwrap();
        assert_eq!(manager.prune_at(now).await.unwrap(), 1);
        assert_eq!(manager.prune_at(now).await.unwrap(), 0, "prune should be idempotent");

        let remaining = store.range(DateTime::<Utc>::MIN_UTC, 10).await.unwrap();
        assert_eq!(remaining, vec![MetricSample::new(now)]);
    }
}

/// latest() tracks the maximum timestamp even when inserts arrive out of order
#[tokio::test]
async fn test_latest_is_max_timestamp() {
    let (_dir, stores) = stores();
    for store in stores {
        for secs in [5, 9, 2, 7] {
            store.insert(MetricSample::new(at(secs))).await.unwrap();
        }
        assert_eq!(store.latest().await.unwrap().unwrap().timestamp, at(9));

        store.prune(at(8)).await.unwrap();
        assert_eq!(store.latest().await.unwrap().unwrap().timestamp, at(9));
        assert_eq!(store.count().await.unwrap(), 1);
    }
}

/// range() output is ascending, within the window and no longer than the limit
#[tokio::test]
async fn test_range_ordering_and_bounds() {
    let (_dir, stores) = stores();
    for store in stores {
        for secs in (0..50).rev() {
            store.insert(MetricSample::new(at(secs))).await.unwrap();
        }

        for (since, limit) in [(0, 10), (20, 100), (45, 3), (60, 5), (0, 0)] {
            let rows = store.range(at(since), limit).await.unwrap();
            assert!(rows.len() <= limit);
            assert!(rows.iter().all(|s| s.timestamp >= at(since)));
            assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            if let Some(last) = rows.last() {
                assert_eq!(last.timestamp, at(49), "truncation keeps the newest rows");
            }
        }
    }
}

/// Bounds between two milliseconds behave the same on both backends
#[tokio::test]
async fn test_sub_millisecond_bounds() {
    let (_dir, stores) = stores();
    let bound = Utc.timestamp_opt(1, 500_000).unwrap();
    for store in stores {
        store.insert(MetricSample::new(at(1))).await.unwrap();
        store
            .insert(MetricSample::new(at(1) + chrono::Duration::milliseconds(1)))
            .await
            .unwrap();

        let rows = store.range(bound, 10).await.unwrap();
        assert_eq!(rows.len(), 1, "{:?}", store.policy());
        assert!(rows.iter().all(|s| s.timestamp >= bound));

        assert_eq!(store.prune(bound).await.unwrap(), 1, "{:?}", store.policy());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}

/// Samples with sub-millisecond timestamps are stored at millisecond precision
#[tokio::test]
async fn test_fine_timestamps_are_normalized_on_insert() {
    let (_dir, stores) = stores();
    let sample = MetricSample {
        timestamp: Utc.timestamp_opt(42, 987_654_321).unwrap(),
        cpu_percent: Some(9.0),
        memory_percent: Some(8.0),
        disk_percent: None,
        temperature_celsius: None,
    };
    for store in stores {
        store.insert(sample).await.unwrap();
        let stored = store.latest().await.unwrap().unwrap();
        assert_eq!(stored, sample.normalized(), "{:?}", store.policy());
        assert_eq!(stored.timestamp.timestamp_subsec_millis(), 987);
    }
}

/// After N inserts into a ring of capacity C < N, exactly the C newest remain
#[tokio::test]
async fn test_memory_capacity_bound() {
    let store = RingStore::new(25);
    for secs in 0..100 {
        store.insert(MetricSample::new(at(secs))).await.unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 25);
    let rows = store.range(at(0), 1000).await.unwrap();
    assert_eq!(rows.first().unwrap().timestamp, at(75));
    assert_eq!(rows.last().unwrap().timestamp, at(99));
}

/// Empty store reads are empty results, not errors
#[tokio::test]
async fn test_empty_store_is_not_an_error() {
    let (_dir, stores) = stores();
    for store in stores {
        let query = QueryService::new(store);
        assert_eq!(query.latest_snapshot().await.unwrap(), None);
        let view = query.dashboard(Duration::from_secs(3600), 3600).await.unwrap();
        assert!(view.latest.is_none());
        assert!(view.window.is_empty());
    }
}

/// Configuration errors are fatal and classified as such
#[test]
fn test_config_errors() {
    let config = PipelineConfig::default().with_retention(RetentionPolicy::Age {
        horizon_secs: 3600,
        prune_interval_secs: 0,
    });
    let err = config.validate().unwrap_err();
    assert!(matches!(err, SystemError::ConfigInvalid(_)));
    assert!(!err.is_transient());
    assert!(format!("{}", err).contains("prune interval"));
}

/// Test SystemError creation and formatting
#[test]
fn test_system_error_types() {
    let store_error = SystemError::store_unavailable("disk full");
    assert!(format!("{}", store_error).contains("disk full"));

    let sensor_error = SystemError::sensor_unavailable("coretemp missing");
    assert!(format!("{}", sensor_error).contains("coretemp missing"));

    let config_error = SystemError::config_invalid("Invalid configuration");
    assert!(format!("{}", config_error).contains("Invalid configuration"));

    let web_error = SystemError::web_server_error("Server startup failed");
    assert!(format!("{}", web_error).contains("Server startup failed"));
}

/// Read API settings resolve request windows against their defaults
#[test]
fn test_web_config() {
    let config = WebConfig::listen_on("127.0.0.1", 9090)
        .with_cors(false)
        .with_window(600, 600)
        .with_max_row_cap(1000);

    assert_eq!(config.listen, "127.0.0.1:9090");
    assert!(!config.enable_cors);
    assert_eq!(
        config.resolve_window(None, None),
        (Duration::from_secs(600), 600)
    );
    assert_eq!(
        config.resolve_window(Some(30), Some(5000)),
        (Duration::from_secs(30), 1000)
    );
}

/// JSON shape consumed by a polling dashboard
#[test]
fn test_json_schema_validation() {
    let sample = MetricSample::new(at(1_700_000_000)).with_cpu(1.0);
    let json_value = serde_json::to_value(sample).expect("Should serialize");

    assert!(json_value.get("timestamp").is_some());
    assert_eq!(json_value["cpu_percent"], 1.0);
    assert!(json_value["memory_percent"].is_null());
    assert!(json_value["disk_percent"].is_null());
    assert!(json_value["temperature_celsius"].is_null());

    let back: MetricSample = serde_json::from_value(json_value).expect("Should deserialize");
    assert_eq!(back, sample);
}
