//! Failure handling: partial and total source failures, timeouts, recovery

use std::time::Duration;

use platform_monitor::{ConnectionStatus, sources::SourceKind};
use pretty_assertions::assert_eq;

use super::helpers::*;

#[tokio::test]
async fn test_some_sources_failing_is_degraded() {
    let sources = [
        ScriptedSource::new("system", SourceKind::System, vec![Ok(system(20.0, 40.0))]),
        ScriptedSource::new("disk", SourceKind::Disk, vec![unavailable("df failed")]),
        ScriptedSource::new("containers", SourceKind::Containers, vec![unavailable("docker missing")]),
    ];
    let monitor = start_monitor(manual_config(), &sources);

    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.connection_status, ConnectionStatus::Degraded);
    assert_eq!((report.succeeded, report.failed), (1, 2));

    let state = monitor.read();
    assert_eq!(state.connection_status, ConnectionStatus::Degraded);
    assert_eq!(state.stale_sources, vec!["disk".to_string(), "containers".to_string()]);
    assert!(state.last_error.is_some());
    assert_eq!(state.snapshot.cpu.usage_percent, 20.0);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_all_sources_failing_keeps_previous_snapshot() {
    let system_source = ScriptedSource::new("system", SourceKind::System, vec![Ok(system(20.0, 40.0))]);
    let disk_source = ScriptedSource::new("disk", SourceKind::Disk, vec![Ok(disk(10, 100))]);
    let monitor = start_monitor(manual_config(), &[system_source.clone(), disk_source.clone()]);

    monitor.collect_now().await.unwrap();
    let healthy = monitor.read();
    assert_eq!(healthy.connection_status, ConnectionStatus::Connected);

    system_source.respond_with(unavailable("host unreachable"));
    disk_source.respond_with(unavailable("disk probe failed"));

    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.connection_status, ConnectionStatus::Disconnected);

    let state = monitor.read();
    assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
    assert_eq!(state.snapshot, healthy.snapshot);
    assert_eq!(state.services, healthy.services);
    assert_eq!(state.version, healthy.version + 1);
    let last_error = state.last_error.clone().unwrap();
    assert!(
        last_error.contains("host unreachable") || last_error.contains("disk probe failed"),
        "unexpected last error: {last_error}"
    );

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_retries_continue_after_repeated_total_failure() {
    let system_source = ScriptedSource::new("system", SourceKind::System, vec![unavailable("down")]);
    let monitor = start_monitor(manual_config(), &[system_source.clone()]);

    for _ in 0..5 {
        let report = monitor.collect_now().await.unwrap();
        assert_eq!(report.connection_status, ConnectionStatus::Disconnected);
    }
    assert!(monitor.is_running());
    assert_eq!(system_source.calls(), 5);

    system_source.respond_with(Ok(system(30.0, 50.0)));
    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.connection_status, ConnectionStatus::Connected);

    let state = monitor.read();
    assert!(state.last_error.is_none());
    assert!(state.stale_sources.is_empty());
    assert_eq!(state.snapshot.memory.percent, 50.0);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_slow_source_is_cut_off_by_its_deadline() {
    let slow = ScriptedSource::new("disk", SourceKind::Disk, vec![Ok(disk(1, 2))]);
    slow.set_delay(Duration::from_secs(10));
    let sources = [
        ScriptedSource::new("system", SourceKind::System, vec![Ok(system(20.0, 40.0))]),
        slow,
    ];
    let monitor = start_monitor(manual_config(), &sources);

    let report = monitor.collect_now().await.unwrap();

    assert_eq!(report.connection_status, ConnectionStatus::Degraded);
    assert_eq!(report.stale_sources, vec!["disk".to_string()]);
    assert!(report.elapsed < Duration::from_secs(5));
    assert!(monitor.read().last_error.as_deref().unwrap().contains("timed out"));

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_counter_reset_keeps_previous_rate() {
    let network_source = ScriptedSource::new(
        "network",
        SourceKind::Network,
        vec![
            Ok(network(1_000, 0, 0)),
            Ok(network(126_000, 0, 1_000)),
            Ok(network(10, 0, 2_000)),
            Ok(network(125_010, 0, 3_000)),
        ],
    );
    let monitor = start_monitor(manual_config(), &[network_source]);

    monitor.collect_now().await.unwrap();
    monitor.collect_now().await.unwrap();
    assert_eq!(monitor.read().snapshot.network.rx_rate_bps, 1_000_000.0);

    // Reset: no rate, previous figure stays
    monitor.collect_now().await.unwrap();
    assert_eq!(monitor.read().snapshot.network.rx_rate_bps, 1_000_000.0);

    monitor.collect_now().await.unwrap();
    assert_eq!(monitor.read().snapshot.network.rx_rate_bps, 1_000_000.0);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_failed_cycle_does_not_resolve_alerts() {
    let system_source = ScriptedSource::new("system", SourceKind::System, vec![Ok(system(95.0, 40.0))]);
    let monitor = start_monitor(manual_config(), &[system_source.clone()]);

    monitor.collect_now().await.unwrap();
    assert_eq!(monitor.read().firing_alerts().count(), 1);

    system_source.respond_with(unavailable("gone"));
    monitor.collect_now().await.unwrap();
    assert_eq!(monitor.read().firing_alerts().count(), 1);

    monitor.shutdown().await;
}
