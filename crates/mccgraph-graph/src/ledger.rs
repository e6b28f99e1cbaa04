//! Per-run accumulator for discovered accounts.
//!
//! - The visited set is a `DashSet`, `claim` is its atomic check-and-insert,
//!   so concurrently expanding siblings can never both expand one account.
//! - Nodes are appended to an arena in discovery order; parent links are
//!   kept as `child -> parent` edges and only turned into a tree by
//!   [`crate::assembler::assemble`] once the run is over.

use crate::assembler::assemble;
use crate::result::{BranchFailure, TraversalResult};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use mccgraph_core::{AccessLevel, Account, AccountId, DirectoryError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    direct_ids: Vec<AccountId>,
    direct_set: HashSet<AccountId>,
    entry_points: Vec<AccountId>,
    nodes: Vec<Account>,
    edges: HashMap<AccountId, AccountId>,
    failures: Vec<BranchFailure>,
    depth_limited: usize,
    cancelled: bool,
}

/// Owned by exactly one traversal run and dropped with it.
#[derive(Debug, Default)]
pub struct DiscoveryLedger {
    visited: DashSet<AccountId>,
    state: Mutex<LedgerState>,
}

impl DiscoveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `account_id` as expanded. Returns `false` if another branch got
    /// there first.
    pub fn claim(&self, account_id: &str) -> bool {
        self.visited.insert(account_id.to_string())
    }

    pub fn set_direct_access(&self, ids: &[AccountId]) {
        let mut state = self.state.lock();
        state.direct_ids = ids.to_vec();
        state.direct_set = ids.iter().cloned().collect();
    }

    pub fn is_direct(&self, account_id: &str) -> bool {
        self.state.lock().direct_set.contains(account_id)
    }

    pub fn set_entry_points(&self, ids: &[AccountId]) {
        self.state.lock().entry_points = ids.to_vec();
    }

    /// Appends a node; a non-root node also records its parent edge.
    pub fn record_node(&self, account: Account) {
        let mut state = self.state.lock();
        if !account.is_root() {
            state
                .edges
                .insert(account.id.clone(), account.discovered_via.clone());
        }
        state.nodes.push(account);
    }

    pub fn record_failure(&self, account_id: &str, error: &DirectoryError) {
        self.state.lock().failures.push(BranchFailure {
            account_id: account_id.to_string(),
            kind: error.kind(),
            message: error.message().to_string(),
        });
    }

    pub fn record_depth_cutoff(&self) {
        self.state.lock().depth_limited += 1;
    }

    pub fn mark_cancelled(&self) {
        self.state.lock().cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Freezes the ledger into the run's result.
    pub fn into_result(self, run_id: Uuid, started_at: DateTime<Utc>, elapsed_millis: u64) -> TraversalResult {
        let mut state = self.state.into_inner();

        // Concurrent branches record in completion order; entry-point roots
        // still come out in the order they were listed.
        let rank: HashMap<&str, usize> = state
            .entry_points
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        state.nodes.sort_by_key(|n| match n.is_root() {
            true => rank.get(n.id.as_str()).copied().unwrap_or(usize::MAX),
            false => usize::MAX,
        });

        let count = |level: AccessLevel| {
            state
                .nodes
                .iter()
                .filter(|n| n.access_level == level)
                .count()
        };
        let direct_access_count = count(AccessLevel::DirectAccess);
        let via_manager_count = count(AccessLevel::ViaManager);
        let max_depth_reached = state.nodes.iter().map(|n| n.level).max().unwrap_or(0);
        let inaccessible_ids = state
            .failures
            .iter()
            .map(|f| f.account_id.clone())
            .collect();

        let forest = assemble(&state.nodes, &state.edges);

        TraversalResult {
            run_id,
            started_at,
            forest,
            entry_point_manager_ids: state.entry_points,
            direct_access_ids: state.direct_ids,
            total_discovered: state.nodes.len(),
            direct_access_count,
            via_manager_count,
            error_count: state.failures.len(),
            inaccessible_ids,
            failures: state.failures,
            depth_limited_count: state.depth_limited,
            max_depth_reached,
            elapsed_millis,
            cancelled: state.cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mccgraph_core::AccountDetails;
    use std::sync::Arc;

    fn node(id: &str, via: &str, level: usize, access: AccessLevel) -> Account {
        Account::from_details(id, AccountDetails::new(id, level == 0), level, via, access)
    }

    #[test]
    fn claim_is_once_per_id() {
        let ledger = DiscoveryLedger::new();
        assert!(ledger.claim("1"));
        assert!(!ledger.claim("1"));
        assert!(ledger.claim("2"));
        assert!(!ledger.claim("2"));
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let ledger = Arc::new(DiscoveryLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.claim("shared"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn result_counts_levels_and_failures() {
        let ledger = DiscoveryLedger::new();
        ledger.set_direct_access(&["m".to_string()]);
        ledger.set_entry_points(&["m".to_string()]);
        ledger.record_node(node("m", "m", 0, AccessLevel::DirectAccess));
        ledger.record_node(node("c1", "m", 1, AccessLevel::ViaManager));
        ledger.record_node(node("c2", "c1", 2, AccessLevel::Unknown));
        ledger.record_failure("c2", &DirectoryError::NotFound("gone".into()));
        ledger.record_depth_cutoff();

        let result = ledger.into_result(Uuid::nil(), Utc::now(), 7);
        assert_eq!(result.total_discovered, 3);
        assert_eq!(result.direct_access_count, 1);
        assert_eq!(result.via_manager_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.inaccessible_ids, vec!["c2".to_string()]);
        assert_eq!(result.depth_limited_count, 1);
        assert_eq!(result.max_depth_reached, 2);
        assert_eq!(result.forest.len(), 1);
        assert!(result.find("c2").is_some());
    }
}
