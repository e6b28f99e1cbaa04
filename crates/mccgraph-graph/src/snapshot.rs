//! In-memory [`AccountDirectory`] backed by a JSON snapshot of an account
//! hierarchy. Used by the CLI for offline runs and by tests.
//!
//! Acting-as rules follow the live directory: with a login customer `M`,
//! only `M` and accounts below it can be read. Without one, only the
//! directly visible accounts can.

use async_trait::async_trait;
use mccgraph_core::{
    AccountDetails, AccountDirectory, AccountId, AccountStatus, ChildAccount, CredentialContext,
    DirectoryError, DirectoryResult, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySnapshot {
    /// Accounts the credential can see without acting as anyone.
    pub visible: Vec<AccountId>,
    pub accounts: Vec<SnapshotAccount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotAccount {
    pub id: AccountId,
    pub display_name: String,
    pub currency_code: String,
    pub time_zone: String,
    pub is_manager: bool,
    pub status: AccountStatus,
    /// Immediate clients, in listing order.
    pub children: Vec<AccountId>,
}

impl SnapshotAccount {
    fn details(&self) -> AccountDetails {
        AccountDetails {
            display_name: self.display_name.clone(),
            currency_code: self.currency_code.clone(),
            time_zone: self.time_zone.clone(),
            is_manager: self.is_manager,
        }
    }
}

pub struct SnapshotDirectory {
    visible: Vec<AccountId>,
    accounts: HashMap<AccountId, SnapshotAccount>,
}

impl SnapshotDirectory {
    pub fn new(snapshot: DirectorySnapshot) -> Self {
        let accounts = snapshot
            .accounts
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();
        Self {
            visible: snapshot.visible,
            accounts,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let snapshot: DirectorySnapshot = serde_json::from_str(json)?;
        Ok(Self::new(snapshot))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let directory = Self::from_json_str(&content)?;
        debug!(
            path = %path.display(),
            accounts = directory.accounts.len(),
            visible = directory.visible.len(),
            "Loaded directory snapshot"
        );
        Ok(directory)
    }

    /// Whether `target` is `ancestor` or somewhere below it.
    fn is_within(&self, ancestor: &str, target: &str) -> bool {
        let mut queue = VecDeque::from([ancestor]);
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(account) = self.accounts.get(id) {
                queue.extend(account.children.iter().map(String::as_str));
            }
        }
        false
    }

    fn resolve(&self, ctx: &CredentialContext, account_id: &str) -> DirectoryResult<&SnapshotAccount> {
        let account = self
            .accounts
            .get(account_id)
            .ok_or_else(|| DirectoryError::NotFound(format!("customer {account_id} does not exist")))?;

        let reachable = match ctx.login_customer_id() {
            Some(login) => {
                self.visible.iter().any(|root| self.is_within(root, login))
                    && self.is_within(login, account_id)
            }
            None => self.visible.iter().any(|id| id == account_id),
        };
        if !reachable {
            return Err(DirectoryError::NotFound(format!(
                "customer {account_id} is not accessible while acting as {}",
                ctx.login_customer_id().unwrap_or("no login customer")
            )));
        }
        Ok(account)
    }
}

#[async_trait]
impl AccountDirectory for SnapshotDirectory {
    async fn list_directly_visible_accounts(
        &self,
        _ctx: &CredentialContext,
    ) -> DirectoryResult<Vec<AccountId>> {
        Ok(self.visible.clone())
    }

    async fn is_manager(&self, ctx: &CredentialContext, account_id: &str) -> DirectoryResult<bool> {
        Ok(self.resolve(ctx, account_id)?.is_manager)
    }

    async fn fetch_account_details(
        &self,
        ctx: &CredentialContext,
        account_id: &str,
    ) -> DirectoryResult<AccountDetails> {
        Ok(self.resolve(ctx, account_id)?.details())
    }

    async fn list_immediate_children(
        &self,
        ctx: &CredentialContext,
        manager_id: &str,
    ) -> DirectoryResult<Vec<ChildAccount>> {
        let manager = self.resolve(ctx, manager_id)?;
        Ok(manager
            .children
            .iter()
            .map(|id| match self.accounts.get(id) {
                Some(child) => ChildAccount::new(id.clone(), child.is_manager)
                    .with_status(child.status)
                    .with_details(child.details()),
                None => ChildAccount::new(id.clone(), false),
            })
            .collect())
    }
}
