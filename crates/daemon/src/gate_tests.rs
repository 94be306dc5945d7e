// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn repo(name: &str) -> RepoKey {
    RepoKey::derive(name)
}

fn server(name: &str) -> ServerKey {
    ServerKey::new(name)
}

#[test]
fn acquires_up_to_global_cap() {
    let gate = ConversionGate::new(2, 10);
    let a = gate.try_acquire(&repo("a"), &server("s1"), None);
    let b = gate.try_acquire(&repo("b"), &server("s2"), None);
    assert!(a.is_some());
    assert!(b.is_some());
    assert!(gate.try_acquire(&repo("c"), &server("s3"), None).is_none());
}

#[test]
fn per_server_cap_is_enforced() {
    let gate = ConversionGate::new(10, 1);
    let a = gate.try_acquire(&repo("a"), &server("s1"), None);
    assert!(a.is_some());
    assert!(gate.try_acquire(&repo("b"), &server("s1"), None).is_none());
    // A different server still has slots
    assert!(gate.try_acquire(&repo("c"), &server("s2"), None).is_some());
}

#[test]
fn dropping_the_guard_returns_both_slots() {
    let gate = ConversionGate::new(1, 1);
    let guard = gate.try_acquire(&repo("a"), &server("s1"), None).unwrap();
    assert!(gate.try_acquire(&repo("b"), &server("s1"), None).is_none());
    drop(guard);
    assert!(gate.try_acquire(&repo("b"), &server("s1"), None).is_some());
}

#[test]
fn failed_server_acquire_releases_the_global_slot() {
    let gate = ConversionGate::new(2, 1);
    let _held = gate.try_acquire(&repo("a"), &server("s1"), None).unwrap();
    // Server s1 is full; the global permit taken for this attempt must
    // come back.
    assert!(gate.try_acquire(&repo("b"), &server("s1"), None).is_none());
    assert_eq!(gate.global_available(), 1);
}

#[test]
fn idle_counts_return_to_caps_after_churn() {
    let gate = ConversionGate::new(3, 2);
    for round in 0..5 {
        let a = gate.try_acquire(&repo("a"), &server("s1"), None).unwrap();
        let b = gate.try_acquire(&repo("b"), &server("s1"), None).unwrap();
        let c = gate.try_acquire(&repo("c"), &server("s2"), None).unwrap();
        drop((a, b, c));
        let status = gate.status();
        assert_eq!(status.global_in_use, 0, "round {round}");
        assert!(status.servers.iter().all(|s| s.in_use == 0), "round {round}");
    }
    assert_eq!(gate.global_available(), 3);
}

#[test]
fn status_reports_holders() {
    let gate = ConversionGate::new(10, 5);
    let _a = gate.try_acquire(&repo("a"), &server("s1"), None).unwrap();
    let _b = gate.try_acquire(&repo("b"), &server("s1"), None).unwrap();
    let status = gate.status();
    assert_eq!(status.global_in_use, 2);
    assert_eq!(status.global_cap, 10);
    assert_eq!(status.servers.len(), 1);
    let s1 = &status.servers[0];
    assert_eq!(s1.in_use, 2);
    assert_eq!(s1.cap, 5);
    assert_eq!(s1.active_repos, vec![repo("a"), repo("b")]);
}

#[test]
fn server_cap_override_applies_on_first_use() {
    let gate = ConversionGate::new(10, 10);
    let _a = gate.try_acquire(&repo("a"), &server("s1"), Some(1)).unwrap();
    assert!(gate.try_acquire(&repo("b"), &server("s1"), Some(1)).is_none());
    // Later override changes are ignored for an existing server gate
    assert!(gate.try_acquire(&repo("c"), &server("s1"), Some(5)).is_none());
}

#[test]
fn active_set_clears_on_release() {
    let gate = ConversionGate::new(2, 2);
    let guard = gate.try_acquire(&repo("a"), &server("s1"), None).unwrap();
    assert_eq!(gate.status().servers[0].active_repos.len(), 1);
    drop(guard);
    assert!(gate.status().servers[0].active_repos.is_empty());
}

#[test]
fn caps_scenario_two_servers() {
    // 20 repos across two servers, global cap 10, per-server cap 5:
    // exactly 10 jobs run, 5 from each server.
    let gate = ConversionGate::new(10, 5);
    let mut guards = Vec::new();
    let mut acquired = 0;
    for i in 0..20 {
        let server_key = if i < 10 { server("s1") } else { server("s2") };
        if let Some(g) = gate.try_acquire(&repo(&format!("r{i}")), &server_key, None) {
            guards.push(g);
            acquired += 1;
        }
    }
    assert_eq!(acquired, 10);
    let status = gate.status();
    assert_eq!(status.global_in_use, 10);
    for s in &status.servers {
        assert_eq!(s.in_use, 5, "server {}", s.server_key);
    }
}
