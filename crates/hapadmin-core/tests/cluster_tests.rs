//! End-to-end tests against fake HAProxy processes on real UNIX sockets.

use hapadmin_core::{HaProxy, HapError, Lenient, ServerState, Weight};
use hapadmin_test_utils::config::TestConfigBuilder;
use hapadmin_test_utils::tracing_setup::init_test_tracing;
use hapadmin_test_utils::{DaemonScript, FakeCluster, StatRow};
use pretty_assertions::assert_eq;

// ── Fixtures ──────────────────────────────────────────────────────

fn process(process_num: u32, stot: u32, weight: u32) -> DaemonScript {
    DaemonScript::haproxy(process_num)
        .with_row(StatRow::frontend("www", 2).with("req_tot", stot))
        .with_row(StatRow::backend("app", 3).with("stot", stot))
        .with_row(
            StatRow::server("app", "web1", 3, 1)
                .with("stot", stot)
                .with("weight", weight),
        )
}

async fn connect(cluster: &FakeCluster) -> HaProxy {
    let config = TestConfigBuilder::new().socket_dir(cluster.dir()).build();
    HaProxy::connect(&config.connection).await.unwrap()
}

// ── Folding ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_counters_sum_and_weights_average() {
    let cluster = FakeCluster::spawn(vec![process(1, 10, 100), process(2, 15, 50)]);
    let hap = connect(&cluster).await;

    let web1 = hap.backend("app").await.unwrap().server("web1").await.unwrap();
    assert_eq!(web1.metric("stot").await.unwrap(), 25);
    assert_eq!(web1.metric("weight").await.unwrap(), 75);
    assert_eq!(hap.frontend("www").await.unwrap().requests().await.unwrap(), 25);
}

#[tokio::test]
async fn test_divergent_status_is_reported_per_process() {
    let cluster = FakeCluster::spawn(vec![process(1, 1, 1), process(2, 1, 1)]);
    cluster.daemon(1).update(|script| {
        script.set_rows(vec![
            StatRow::backend("app", 3),
            StatRow::server("app", "web1", 3, 1).with("status", "DOWN"),
        ]);
    });
    let hap = connect(&cluster).await;
    let web1 = hap.backend("app").await.unwrap().server("web1").await.unwrap();

    let err = web1.status().await.unwrap_err();
    assert!(matches!(err, HapError::Inconsistent { .. }));
    assert_eq!(err.results().unwrap(), &vec![
        (1, "UP".to_string()),
        (2, "DOWN".to_string())
    ]);
}

// ── Reloads ───────────────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_handles_survive_renumbering() {
    let cluster = FakeCluster::spawn(vec![process(1, 10, 1), process(2, 20, 1)]);
    let hap = connect(&cluster).await;
    let web1 = hap.backend("app").await.unwrap().server("web1").await.unwrap();
    assert_eq!(web1.id().await.unwrap(), 1);

    cluster.update_all(|script| {
        script.set_rows(vec![
            StatRow::backend("app", 7),
            StatRow::server("app", "web0", 7, 1),
            StatRow::server("app", "web1", 7, 4).with("stot", 5),
        ]);
    });

    assert_eq!(web1.id().await.unwrap(), 4);
    assert_eq!(web1.requests().await.unwrap(), 10);
}

#[tokio::test]
async fn test_removed_server_is_not_found() {
    init_test_tracing();
    let cluster = FakeCluster::spawn(vec![process(1, 1, 1)]);
    let hap = connect(&cluster).await;
    let web1 = hap.backend("app").await.unwrap().server("web1").await.unwrap();

    cluster.update_all(|script| script.set_rows(vec![StatRow::backend("app", 3)]));

    assert!(matches!(
        web1.requests().await,
        Err(HapError::NotFound { .. })
    ));
    assert!(!web1.status().await.succeeded());
}

// ── Commands ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_reach_every_process() {
    let scripts = (1..=2)
        .map(|n| {
            process(n, 1, 1)
                .accept("set weight app/web1 50")
                .respond_to("set server app/web1 state maint", "Done.\n")
        })
        .collect();
    let cluster = FakeCluster::spawn(scripts);
    let hap = connect(&cluster).await;
    let web1 = hap.backend("app").await.unwrap().server("web1").await.unwrap();

    assert!(web1.set_weight(Weight::absolute(50).unwrap()).await.unwrap());
    assert!(web1.set_state(ServerState::Maint).await.unwrap());
    for daemon in cluster.daemons() {
        assert!(daemon.received().contains(&"set weight app/web1 50".to_string()));
    }
}

#[tokio::test]
async fn test_known_error_fails_the_command() {
    let cluster = FakeCluster::spawn(vec![
        process(1, 1, 1).respond_to("set weight app/web1 300%", "Value out of range.\n\n"),
    ]);
    let hap = connect(&cluster).await;
    let web1 = hap.backend("app").await.unwrap().server("web1").await.unwrap();

    let err = web1.set_weight(Weight::Relative(300)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "command failed: Value out of range."
    );
}

#[tokio::test]
async fn test_divergent_command_output_is_multiple_results() {
    let cluster = FakeCluster::spawn(vec![
        process(1, 1, 1).accept("disable frontend www"),
        process(2, 1, 1).respond_to("disable frontend www", "Frontend was previously shut down, cannot disable.\n"),
    ]);
    let hap = connect(&cluster).await;

    let err = hap.frontend("www").await.unwrap().disable().await.unwrap_err();
    assert!(matches!(err, HapError::MultipleResults { .. }));
    assert_eq!(err.results().unwrap().len(), 2);
}

// ── Discovery ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_foreign_socket_file_is_rejected() {
    let cluster = FakeCluster::spawn(vec![DaemonScript::haproxy(1).with_info("Name", "nginx")]);
    let socket = cluster.daemon(0).path().to_path_buf();
    let config = TestConfigBuilder::new().socket_file(&socket).build();

    let err = HaProxy::connect(&config.connection).await.unwrap_err();
    assert!(matches!(
        err,
        HapError::ApplicationMismatch { found: Some(ref name), .. } if name == "nginx"
    ));
}

#[tokio::test]
async fn test_processes_are_ordered_by_ordinal() {
    let cluster = FakeCluster::spawn(vec![process(3, 1, 1), process(1, 1, 1), process(2, 1, 1)]);
    let hap = connect(&cluster).await;

    let ordinals: Vec<u32> = hap.endpoints().iter().map(|e| e.process_num()).collect();
    assert_eq!(ordinals, vec![1, 2, 3]);
    assert_eq!(hap.process_ids().await.unwrap(), vec![(1, 1001), (2, 1002), (3, 1003)]);
}
