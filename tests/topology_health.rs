//! Topology and Health Tests
//!
//! Probing and classification through the public API:
//! - a probe never fails as a whole; per-node problems become entries
//! - replica health labels follow the thread flags and delay
//! - the HTTP-facing verdict and the monitor classification agree on
//!   which replicas are running

use std::sync::Arc;

use replwatch::gateway::memory::{MemoryGateway, SimNode};
use replwatch::gateway::Credentials;
use replwatch::health::{check_node, classify, evaluate, DownReason, HealthClass, HealthVerdict};
use replwatch::topology::{
    parse_sequence, DiscoveryMode, Gtid, NodeAddress, NodeRole, ReplicationState, TopologyError,
    TopologyProber,
};

fn addr(host: &str) -> NodeAddress {
    NodeAddress::new(host, 3306)
}

fn prober(gateway: &MemoryGateway, discovery: DiscoveryMode) -> TopologyProber {
    TopologyProber::new(
        Arc::new(gateway.clone()),
        Credentials::from_pair("monitor:secret"),
        discovery,
        3306,
    )
}

fn state(io: bool, sql: bool, delay: Option<u64>) -> ReplicationState {
    ReplicationState::replicating_from(&addr("db1"))
        .with_threads(io, sql)
        .with_delay(delay)
}

// =============================================================================
// GTID parsing
// =============================================================================

#[test]
fn test_gtid_fields() {
    let gtid = Gtid::parse("0-1-1057").unwrap();
    assert_eq!(gtid.domain, 0);
    assert_eq!(gtid.server_id, 1);
    assert_eq!(gtid.sequence, 1057);
    assert_eq!(gtid.to_string(), "0-1-1057");
    assert_eq!(parse_sequence(" 2-10-77 ").unwrap(), 77);
}

#[test]
fn test_gtid_rejects_malformed_input() {
    for input in ["", "0-1", "0-1-2-3", "a-1-2", "0-1-", "-1-5"] {
        assert!(
            matches!(Gtid::parse(input), Err(TopologyError::MalformedGtid(_))),
            "{:?}",
            input
        );
    }
    assert!(matches!(
        Gtid::parse("0-1-10,1-2-20"),
        Err(TopologyError::MultiDomainGtid(_))
    ));
}

// =============================================================================
// Classification
// =============================================================================

#[test]
fn test_classification_table() {
    let cases = [
        (true, true, Some(0), HealthClass::Ok, "Running OK"),
        (true, true, Some(2), HealthClass::Late(2), "Running LATE: 2 sec"),
        (false, true, None, HealthClass::IoStopped, "NOT OK, IO Stopped"),
        (true, false, None, HealthClass::SqlStopped, "NOT OK, SQL Stopped"),
        (false, false, None, HealthClass::AllStopped, "NOT OK, ALL Stopped"),
        (true, true, None, HealthClass::AllStopped, "NOT OK, ALL Stopped"),
    ];
    for (io, sql, delay, class, label) in cases {
        let got = classify(&state(io, sql, delay));
        assert_eq!(got, class, "io={} sql={} delay={:?}", io, sql, delay);
        assert_eq!(got.label(), label);
    }
}

/// A replica the monitor shows as running is never reported down for
/// broken replication, and a stopped one always is.
#[test]
fn test_verdict_agrees_with_classification() {
    for (io, sql, delay) in [
        (true, true, Some(0)),
        (true, true, Some(3)),
        (false, true, None),
        (true, false, None),
        (false, false, None),
    ] {
        let replica = state(io, sql, delay);
        let running = classify(&replica).is_running();
        let verdict = evaluate(Some(&replica), 100);
        assert_eq!(running, verdict.is_up(), "io={} sql={}", io, sql);
    }
}

// =============================================================================
// Health verdicts
// =============================================================================

#[test]
fn test_health_verdicts_against_nodes() {
    let gateway = MemoryGateway::new();
    gateway.add_node(&addr("db1"), SimNode::primary(10));
    gateway.add_node(
        &addr("db2"),
        SimNode::replica_of(&addr("db1"), 10).with_delay(Some(0)),
    );
    gateway.add_node(
        &addr("db3"),
        SimNode::replica_of(&addr("db1"), 8).with_delay(Some(9)),
    );
    gateway.add_node(
        &addr("db4"),
        SimNode::replica_of(&addr("db1"), 8).with_threads(true, false).with_delay(None),
    );
    let creds = Credentials::default();

    let verdict = |host: &str| check_node(&gateway, &creds, &addr(host), 5);

    assert_eq!(verdict("db2"), HealthVerdict::Up);
    assert_eq!(verdict("db2").message(), "200 Health OK");
    assert_eq!(verdict("db3"), HealthVerdict::Down(DownReason::Delayed(9)));
    assert_eq!(verdict("db3").message(), "503 Delayed Replication (9)");
    assert_eq!(
        verdict("db4"),
        HealthVerdict::Down(DownReason::BrokenReplication)
    );
    assert_eq!(
        verdict("db1"),
        HealthVerdict::Down(DownReason::NoReplication)
    );
    assert_eq!(
        verdict("nowhere"),
        HealthVerdict::Down(DownReason::NoConnection)
    );
    assert_eq!(verdict("nowhere").status_code(), 503);
}

// =============================================================================
// Probing
// =============================================================================

#[test]
fn test_auto_discovery_uses_processlist_hosts() {
    let gateway = MemoryGateway::new();
    gateway.add_node(
        &addr("db1"),
        SimNode::primary(10).with_consumers(&["db2:51234", "db3:40001", "db2:51299"]),
    );
    gateway.add_node(&addr("db2"), SimNode::replica_of(&addr("db1"), 10));
    gateway.add_node(&addr("db3"), SimNode::replica_of(&addr("db1"), 10));

    let snapshot = prober(&gateway, DiscoveryMode::Auto).probe(&addr("db1"));

    assert_eq!(snapshot.replica_addresses(), vec![addr("db2"), addr("db3")]);
    assert!(snapshot.primary.is_reachable());
    assert!(snapshot.primary.warnings.is_empty());
    for entry in &snapshot.replicas {
        assert_eq!(entry.role(), NodeRole::Replica);
        assert_eq!(entry.health, Some(HealthClass::Ok));
        assert!(entry.warnings.is_empty());
    }
}

#[test]
fn test_probe_survives_node_failures() {
    let gateway = MemoryGateway::new();
    gateway.add_node(&addr("db1"), SimNode::primary(10));
    gateway.add_node(&addr("db2"), SimNode::replica_of(&addr("db1"), 10));
    gateway.add_node(&addr("db3"), SimNode::replica_of(&addr("db1"), 10));
    gateway.add_node(&addr("db4"), SimNode::primary(3));
    gateway.add_node(&addr("db5"), SimNode::replica_of(&addr("other"), 10));
    gateway.set_reachable(&addr("db3"), false);

    let list = vec![addr("db2"), addr("db3"), addr("db4"), addr("db5")];
    let snapshot = prober(&gateway, DiscoveryMode::Static(list)).probe(&addr("db1"));

    assert_eq!(snapshot.replicas.len(), 4);
    let role = |host: &str| snapshot.entry(&addr(host)).unwrap().role();
    assert_eq!(role("db2"), NodeRole::Replica);
    assert_eq!(role("db3"), NodeRole::Unreachable);
    assert_eq!(role("db4"), NodeRole::Detached);
    assert_eq!(role("db5"), NodeRole::Replica);

    let db5 = snapshot.entry(&addr("db5")).unwrap();
    assert!(db5.warnings.iter().any(|w| w.contains("instead of db1:3306")));
    assert!(snapshot.entry(&addr("db3")).unwrap().health.is_none());
}

#[test]
fn test_unreachable_primary_in_auto_mode() {
    let gateway = MemoryGateway::new();
    gateway.add_node(&addr("db1"), SimNode::primary(10).with_consumers(&["db2:1"]));
    gateway.add_node(&addr("db2"), SimNode::replica_of(&addr("db1"), 10));
    gateway.set_reachable(&addr("db1"), false);

    let snapshot = prober(&gateway, DiscoveryMode::Auto).probe(&addr("db1"));

    assert!(!snapshot.primary.is_reachable());
    assert!(snapshot.is_empty());
    assert!(snapshot.primary.warnings[0].starts_with("primary unreachable"));
}

#[test]
fn test_snapshot_json_shape() {
    let gateway = MemoryGateway::new();
    gateway.add_node(&addr("db1"), SimNode::primary(10).with_consumers(&["db2:1"]));
    gateway.add_node(
        &addr("db2"),
        SimNode::replica_of(&addr("db1"), 9).with_delay(Some(4)),
    );

    let snapshot = prober(&gateway, DiscoveryMode::Auto).probe(&addr("db1"));
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["primary"]["address"], "db1:3306");
    let replica = &json["replicas"][0];
    assert_eq!(replica["address"], "db2:3306");
    assert_eq!(replica["health"]["class"], "LATE");
    assert_eq!(replica["health"]["delay"], 4);
}
