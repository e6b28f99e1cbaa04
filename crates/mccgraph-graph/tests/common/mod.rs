//! Scripted directory used by the traversal integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use mccgraph_core::{
    AccountDetails, AccountDirectory, AccountId, AccountStatus, ChildAccount, CredentialContext,
    Credentials, DirectoryError, DirectoryResult,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const LIST_VISIBLE: &str = "list_directly_visible_accounts";
pub const IS_MANAGER: &str = "is_manager";
pub const FETCH_DETAILS: &str = "fetch_account_details";
pub const LIST_CHILDREN: &str = "list_immediate_children";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub account_id: AccountId,
    pub acting_as: Option<AccountId>,
}

#[derive(Debug, Clone)]
struct ScriptedAccount {
    details: AccountDetails,
    status: AccountStatus,
    children: Vec<AccountId>,
}

/// Answers from a fixed hierarchy and records every call it receives.
/// Acting-as is not enforced; tests assert on the recorded identities.
#[derive(Default)]
pub struct ScriptedDirectory {
    visible: Vec<AccountId>,
    accounts: HashMap<AccountId, ScriptedAccount>,
    failures: HashMap<(&'static str, AccountId), DirectoryError>,
    hanging: HashSet<(&'static str, AccountId)>,
    fail_visible: Option<DirectoryError>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self, ids: &[&str]) -> Self {
        self.visible = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn manager(mut self, id: &str, name: &str, children: &[&str]) -> Self {
        self.accounts.insert(
            id.to_string(),
            ScriptedAccount {
                details: AccountDetails::new(name, true).with_currency("USD"),
                status: AccountStatus::Enabled,
                children: children.iter().map(|c| c.to_string()).collect(),
            },
        );
        self
    }

    pub fn client(mut self, id: &str, name: &str) -> Self {
        self.accounts.insert(
            id.to_string(),
            ScriptedAccount {
                details: AccountDetails::new(name, false).with_currency("USD"),
                status: AccountStatus::Enabled,
                children: Vec::new(),
            },
        );
        self
    }

    pub fn status(mut self, id: &str, status: AccountStatus) -> Self {
        if let Some(account) = self.accounts.get_mut(id) {
            account.status = status;
        }
        self
    }

    pub fn fail(mut self, operation: &'static str, id: &str, error: DirectoryError) -> Self {
        self.failures.insert((operation, id.to_string()), error);
        self
    }

    pub fn fail_visible(mut self, error: DirectoryError) -> Self {
        self.fail_visible = Some(error);
        self
    }

    /// The call never completes.
    pub fn hang(mut self, operation: &'static str, id: &str) -> Self {
        self.hanging.insert((operation, id.to_string()));
        self
    }

    /// Every call takes `latency` to answer.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Most calls that were ever in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, operation: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .collect()
    }

    async fn enter(
        &self,
        operation: &'static str,
        ctx: &CredentialContext,
        account_id: &str,
    ) -> DirectoryResult<()> {
        self.calls.lock().push(Call {
            operation,
            account_id: account_id.to_string(),
            acting_as: ctx.login_customer_id().map(str::to_string),
        });
        if let Some(latency) = self.latency {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if self.hanging.contains(&(operation, account_id.to_string())) {
            futures::future::pending::<()>().await;
        }
        match self.failures.get(&(operation, account_id.to_string())) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn account(&self, account_id: &str) -> DirectoryResult<&ScriptedAccount> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| DirectoryError::NotFound(format!("no account {account_id}")))
    }
}

#[async_trait]
impl AccountDirectory for ScriptedDirectory {
    async fn list_directly_visible_accounts(
        &self,
        ctx: &CredentialContext,
    ) -> DirectoryResult<Vec<AccountId>> {
        self.enter(LIST_VISIBLE, ctx, "*").await?;
        match &self.fail_visible {
            Some(error) => Err(error.clone()),
            None => Ok(self.visible.clone()),
        }
    }

    async fn is_manager(&self, ctx: &CredentialContext, account_id: &str) -> DirectoryResult<bool> {
        self.enter(IS_MANAGER, ctx, account_id).await?;
        Ok(self.account(account_id)?.details.is_manager)
    }

    async fn fetch_account_details(
        &self,
        ctx: &CredentialContext,
        account_id: &str,
    ) -> DirectoryResult<AccountDetails> {
        self.enter(FETCH_DETAILS, ctx, account_id).await?;
        Ok(self.account(account_id)?.details.clone())
    }

    async fn list_immediate_children(
        &self,
        ctx: &CredentialContext,
        manager_id: &str,
    ) -> DirectoryResult<Vec<ChildAccount>> {
        self.enter(LIST_CHILDREN, ctx, manager_id).await?;
        let manager = self.account(manager_id)?;
        Ok(manager
            .children
            .iter()
            .map(|id| match self.accounts.get(id) {
                Some(child) => ChildAccount::new(id.clone(), child.details.is_manager)
                    .with_status(child.status)
                    .with_details(child.details.clone()),
                None => ChildAccount::new(id.clone(), false),
            })
            .collect())
    }
}

pub fn credential() -> CredentialContext {
    let credentials = Credentials::new("client-id", "client-secret", "refresh", "dev-token")
        .expect("test credentials are complete");
    CredentialContext::new(credentials)
}
