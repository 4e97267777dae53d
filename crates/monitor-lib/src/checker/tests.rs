use super::*;
use crate::models::{ProbeMetrics, ResourceStatus};
use crate::test_support::{resource, FakeWorkloadApi, ReverseDecryptor};
use crate::workload::ReplicaSnapshot;
use serde_json::json;
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;

fn deployment(desired: i32, available: i32) -> ReplicaSnapshot {
    ReplicaSnapshot {
        desired,
        ready: available,
        updated: desired,
        available,
        unavailable: desired - available,
        selector: Default::default(),
    }
}

fn checker(api: FakeWorkloadApi) -> (ResourceChecker, Arc<FakeWorkloadApi>, Arc<ReverseDecryptor>) {
    let api = Arc::new(api);
    let decryptor = Arc::new(ReverseDecryptor::default());
    let config = CheckerConfig {
        probe_timeout: Duration::from_millis(500),
        platform_namespace: "platform".to_string(),
        ..Default::default()
    };
    (
        ResourceChecker::new(config, api.clone(), decryptor.clone()).unwrap(),
        api,
        decryptor,
    )
}

#[test]
fn test_checker_keeps_configured_timeout() {
    let config = CheckerConfig {
        probe_timeout: Duration::from_millis(250),
        ..Default::default()
    };
    let checker = ResourceChecker::new(
        config,
        Arc::new(FakeWorkloadApi::default()),
        Arc::new(ReverseDecryptor::default()),
    )
    .unwrap();
    assert_eq!(checker.config().probe_timeout, Duration::from_millis(250));
}

#[tokio::test]
async fn test_unrecognized_instance_is_not_observable() {
    let (checker, _, decryptor) = checker(FakeWorkloadApi::default());
    let mut cache = StatusCache::new();
    let unknown = resource("u1", ResourceInstance::Unrecognized);

    assert!(checker.check(&unknown, &mut cache).await.is_none());
    assert_eq!(decryptor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_singletons_collapse_to_one_probe() {
    let api = FakeWorkloadApi::default().with_deployment("engine-scheduler", deployment(2, 2));
    let (checker, api, _) = checker(api);
    let mut cache = StatusCache::new();

    let first = checker
        .check(&resource("s1", ResourceInstance::Scheduler), &mut cache)
        .await
        .unwrap();
    let second = checker
        .check(&resource("s2", ResourceInstance::Scheduler), &mut cache)
        .await
        .unwrap();

    assert_eq!(api.replica_reads.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert_eq!(first.status, ResourceStatus::Ok);
    assert_eq!(first.replicas(), (Some(2), Some(0)));
}

#[tokio::test]
async fn test_fresh_cache_probes_again() {
    let api = FakeWorkloadApi::default().with_deployment("engine-realtime", deployment(1, 1));
    let (checker, api, _) = checker(api);
    let realtime = resource("rt", ResourceInstance::Realtime);

    checker.check(&realtime, &mut StatusCache::new()).await;
    checker.check(&realtime, &mut StatusCache::new()).await;

    assert_eq!(api.replica_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_scaled_down_singleton_is_not_observable_and_cached() {
    let api = FakeWorkloadApi::default().with_deployment("engine-scheduler", deployment(0, 0));
    let (checker, api, _) = checker(api);
    let mut cache = StatusCache::new();

    assert!(checker
        .check(&resource("s1", ResourceInstance::Scheduler), &mut cache)
        .await
        .is_none());
    assert!(checker
        .check(&resource("s2", ResourceInstance::Scheduler), &mut cache)
        .await
        .is_none());
    assert_eq!(api.replica_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_compute_service_without_available_replicas_is_error() {
    // Access is "decrypted" by reversal
    let api = FakeWorkloadApi::default().with_deployment("orders-api", deployment(3, 0));
    let (checker, _, _) = checker(api);
    let mut api_server = resource("a1", ResourceInstance::ApiServer);
    api_server.access = json!({ "name": "ipa-sredro" });

    let outcome = checker
        .check(&api_server, &mut StatusCache::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, ResourceStatus::Error);
    assert_eq!(outcome.replicas(), (Some(0), Some(3)));
    assert!(outcome.latest_entry().message.contains("no available replicas"));
}

#[tokio::test]
async fn test_workload_read_failure_is_error_not_none() {
    let (checker, _, _) = checker(FakeWorkloadApi::default());
    let mut api_server = resource("a1", ResourceInstance::ApiServer);
    api_server.access = json!({ "name": "gnissim" });

    let outcome = checker
        .check(&api_server, &mut StatusCache::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, ResourceStatus::Error);
    assert!(outcome.latest_entry().message.contains("not found"));
}

#[tokio::test]
async fn test_decryption_failure_is_error_outcome() {
    let api = Arc::new(FakeWorkloadApi::default());
    let decryptor = Arc::new(ReverseDecryptor::failing_on("terces"));
    let checker = ResourceChecker::new(CheckerConfig::default(), api, decryptor).unwrap();

    let mut redis = resource("c1", ResourceInstance::Redis);
    redis.access = json!({ "host": "tsohlacol", "password": "terces" });

    let outcome = checker.check(&redis, &mut StatusCache::new()).await.unwrap();
    assert_eq!(outcome.status, ResourceStatus::Error);
    assert!(outcome
        .latest_entry()
        .message
        .starts_with("Cannot decrypt access settings"));
}

#[tokio::test]
async fn test_reachable_sql_server_is_ok() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let (checker, _, _) = checker(FakeWorkloadApi::default());
    let mut mssql = resource("m1", ResourceInstance::SqlServer);
    mssql.access = json!({ "host": "1.0.0.721", "port": port });

    let outcome = checker.check(&mssql, &mut StatusCache::new()).await.unwrap();
    assert_eq!(outcome.status, ResourceStatus::Ok);
    assert!(outcome.metrics.as_ref().and_then(|m| m.latency_ms).is_some());
}

#[tokio::test]
async fn test_silent_backend_times_out() {
    // Accepts the connection but never answers the PING
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let (checker, _, _) = checker(FakeWorkloadApi::default());
    let mut redis = resource("r1", ResourceInstance::Redis);
    redis.access = json!({ "host": "1.0.0.721", "port": port });

    let outcome = checker.check(&redis, &mut StatusCache::new()).await.unwrap();
    assert_eq!(outcome.status, ResourceStatus::Error);
    assert_eq!(outcome.metrics, None::<ProbeMetrics>);
    assert!(outcome.latest_entry().message.contains("timed out"));
}
