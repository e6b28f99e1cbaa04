use crate::assembler::HierarchyNode;
use chrono::{DateTime, Utc};
use mccgraph_core::{Account, AccountId, FailureKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One branch that could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchFailure {
    pub account_id: AccountId,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one traversal run. Built once by the engine, read-only after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub forest: Vec<HierarchyNode>,
    pub entry_point_manager_ids: Vec<AccountId>,
    pub direct_access_ids: Vec<AccountId>,
    pub total_discovered: usize,
    pub direct_access_count: usize,
    pub via_manager_count: usize,
    pub error_count: usize,
    pub inaccessible_ids: Vec<AccountId>,
    pub failures: Vec<BranchFailure>,
    /// Managers whose client list was not read because of the depth limit.
    pub depth_limited_count: usize,
    pub max_depth_reached: usize,
    pub elapsed_millis: u64,
    /// The run budget ran out before every branch finished.
    pub cancelled: bool,
}

impl TraversalResult {
    pub fn summary(&self) -> String {
        format!(
            "Traversal completed in {} ms. Found {} total accounts ({} direct access, {} via manager). Max depth: {}. Errors: {}. Inaccessible: {}.",
            self.elapsed_millis,
            self.total_discovered,
            self.direct_access_count,
            self.via_manager_count,
            self.max_depth_reached,
            self.error_count,
            self.inaccessible_ids.len()
        )
    }

    pub fn find(&self, account_id: &str) -> Option<&HierarchyNode> {
        self.forest.iter().find_map(|root| root.find(account_id))
    }

    /// Every node of the forest in display order.
    pub fn flatten(&self) -> Vec<&Account> {
        let mut out = Vec::with_capacity(self.total_discovered);
        for root in &self.forest {
            root.walk(&mut out);
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.error_count == 0
    }
}

impl fmt::Display for TraversalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_matches_presenter_format() {
        let result = TraversalResult {
            elapsed_millis: 120,
            total_discovered: 5,
            direct_access_count: 2,
            via_manager_count: 3,
            max_depth_reached: 2,
            error_count: 1,
            inaccessible_ids: vec!["999".to_string()],
            ..Default::default()
        };

        assert_eq!(
            result.summary(),
            "Traversal completed in 120 ms. Found 5 total accounts (2 direct access, 3 via manager). Max depth: 2. Errors: 1. Inaccessible: 1."
        );
        assert_eq!(result.to_string(), result.summary());
        assert!(!result.is_complete());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let result = TraversalResult::default();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("entryPointManagerIds").is_some());
        assert!(json.get("inaccessibleIds").is_some());
        assert!(json.get("maxDepthReached").is_some());
    }
}
