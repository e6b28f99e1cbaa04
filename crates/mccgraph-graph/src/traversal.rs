use crate::ledger::DiscoveryLedger;
use crate::lister::{ChildLister, InlineListing, PerChildLookup};
use crate::result::TraversalResult;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use mccgraph_core::{
    AccessLevel, Account, AccountDetails, AccountDirectory, AccountId, CredentialContext,
    DirectoryError, DirectoryResult, Result, TraversalSettings, TraversalStrategy,
};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_RUN_BUDGET: Duration = Duration::from_secs(60);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for hierarchy traversal
#[derive(Clone)]
pub struct TraversalConfig {
    /// Deepest level (relative to an entry point) that is still recorded
    pub max_depth: usize,
    /// Overall budget; when it runs out the collected nodes are returned
    pub run_budget: Duration,
    /// Timeout for each single directory call
    pub call_timeout: Duration,
    /// Directory calls in flight at once across the whole run. 1 keeps
    /// first-wins attribution strictly depth-first.
    pub max_concurrency: usize,
    /// How a manager's clients are listed
    pub lister: Arc<dyn ChildLister>,
}

impl fmt::Debug for TraversalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalConfig")
            .field("max_depth", &self.max_depth)
            .field("run_budget", &self.run_budget)
            .field("call_timeout", &self.call_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .field("lister", &self.lister.name())
            .finish()
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self::deep()
    }
}

impl TraversalConfig {
    /// Recursive descent, one detail lookup per discovered account.
    pub fn deep() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            run_budget: DEFAULT_RUN_BUDGET,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_concurrency: 1,
            lister: Arc::new(PerChildLookup),
        }
    }

    /// One listing per entry-point manager, immediate clients only.
    pub fn flat() -> Self {
        Self {
            max_depth: 1,
            lister: Arc::new(InlineListing),
            ..Self::deep()
        }
    }

    pub fn from_settings(settings: &TraversalSettings) -> Self {
        let base = match settings.strategy {
            TraversalStrategy::Deep => Self::deep(),
            TraversalStrategy::Flat => Self::flat(),
        };
        base.with_max_depth(settings.effective_max_depth())
            .with_run_budget(Duration::from_millis(settings.run_budget_ms))
            .with_call_timeout(Duration::from_millis(settings.call_timeout_ms))
            .with_max_concurrency(settings.max_concurrency)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_run_budget(mut self, run_budget: Duration) -> Self {
        self.run_budget = run_budget;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_lister(mut self, lister: Arc<dyn ChildLister>) -> Self {
        self.lister = lister;
        self
    }
}

/// State shared by every branch of one run. Never outlives the run.
struct RunContext<'a> {
    run_id: Uuid,
    ledger: &'a DiscoveryLedger,
    cancel: &'a CancellationToken,
    deadline: Instant,
    /// Directory calls in flight across the whole run, not per level.
    permits: Semaphore,
}

impl RunContext<'_> {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }
}

/// One pending `expand(account, acting-as, depth)` step.
struct Expansion {
    account_id: AccountId,
    context: CredentialContext,
    depth: usize,
    discovered_via: AccountId,
    listed_as_manager: bool,
    prefetched: Option<AccountDetails>,
}

impl Expansion {
    fn entry_point(base: &CredentialContext, account_id: AccountId) -> Self {
        Self {
            context: base.acting_as(&account_id),
            depth: 0,
            discovered_via: account_id.clone(),
            listed_as_manager: true,
            prefetched: None,
            account_id,
        }
    }
}

/// Discovers the manager/client hierarchy visible to a credential.
///
/// Every per-account failure is captured in the returned
/// [`TraversalResult`]; `traverse` itself only fails when the initial
/// "directly visible accounts" call fails.
pub struct TraversalEngine {
    directory: Arc<dyn AccountDirectory>,
    config: TraversalConfig,
}

impl TraversalEngine {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self::with_config(directory, TraversalConfig::default())
    }

    pub fn with_config(directory: Arc<dyn AccountDirectory>, config: TraversalConfig) -> Self {
        Self { directory, config }
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    fn concurrency(&self) -> usize {
        self.config.max_concurrency.max(1)
    }

    pub async fn traverse(&self, credential: &CredentialContext) -> Result<TraversalResult> {
        self.traverse_with_cancellation(credential, CancellationToken::new())
            .await
    }

    /// Like [`traverse`](Self::traverse), but stops early (returning what was
    /// collected so far) when `cancel` fires.
    pub async fn traverse_with_cancellation(
        &self,
        credential: &CredentialContext,
        cancel: CancellationToken,
    ) -> Result<TraversalResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = started + self.config.run_budget;
        let ledger = DiscoveryLedger::new();
        let base = credential.without_login_customer();

        info!(
            %run_id,
            max_depth = self.config.max_depth,
            lister = self.config.lister.name(),
            max_concurrency = self.config.max_concurrency,
            "Starting hierarchy traversal"
        );

        {
            let run = RunContext {
                run_id,
                ledger: &ledger,
                cancel: &cancel,
                deadline,
                permits: Semaphore::new(self.concurrency()),
            };

            let finished = tokio::select! {
                biased;
                outcome = self.run(credential, &base, &run) => Some(outcome),
                _ = tokio::time::sleep_until(deadline) => None,
                _ = cancel.cancelled() => None,
            };

            match finished {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    warn!(%run_id, error = %e, "Hierarchy traversal could not start");
                    return Err(e);
                }
                None => ledger.mark_cancelled(),
            }
        }

        if ledger.is_cancelled() {
            warn!(
                %run_id,
                budget_ms = self.config.run_budget.as_millis() as u64,
                discovered = ledger.node_count(),
                "Traversal stopped before completion, returning partial hierarchy"
            );
        }

        let elapsed_millis = started.elapsed().as_millis() as u64;
        let result = ledger.into_result(run_id, started_at, elapsed_millis);
        info!(%run_id, "{}", result.summary());
        Ok(result)
    }

    /// `initial` is the caller's credential as given: its login customer, if
    /// any, authorizes classification and direct-client lookups. The visible
    /// listing and entry-point expansion use `base`, which carries none.
    async fn run(
        &self,
        initial: &CredentialContext,
        base: &CredentialContext,
        run: &RunContext<'_>,
    ) -> Result<()> {
        let visible = match self
            .call(
                run,
                "list_directly_visible_accounts",
                "-",
                self.directory.list_directly_visible_accounts(base),
            )
            .await
        {
            Some(Ok(ids)) => dedup_preserving_order(ids),
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        };
        run.ledger.set_direct_access(&visible);
        info!(run_id = %run.run_id, count = visible.len(), "Listed directly visible accounts");

        let classified: Vec<(AccountId, bool)> = stream::iter(visible)
            .map(|account_id| async move {
                let is_manager = match self
                    .call(
                        run,
                        "is_manager",
                        &account_id,
                        self.directory.is_manager(initial, &account_id),
                    )
                    .await
                {
                    Some(Ok(flag)) => flag,
                    Some(Err(e)) => {
                        warn!(
                            run_id = %run.run_id,
                            account_id = %account_id,
                            error = %e,
                            "Could not determine whether account is a manager, treating it as a client"
                        );
                        false
                    }
                    None => false,
                };
                (account_id, is_manager)
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        let (managers, clients): (Vec<_>, Vec<_>) =
            classified.into_iter().partition(|(_, is_manager)| *is_manager);
        let entry_points: Vec<AccountId> = managers.into_iter().map(|(id, _)| id).collect();
        run.ledger.set_entry_points(&entry_points);
        info!(
            run_id = %run.run_id,
            count = entry_points.len(),
            ids = ?entry_points,
            "Identified entry-point managers"
        );

        let entries = entry_points
            .into_iter()
            .map(|id| Expansion::entry_point(base, id))
            .collect();
        self.expand_all(run, entries).await;

        // Direct clients go last so a client that some manager also lists
        // nests under that manager instead of becoming its own root.
        let unattached: Vec<AccountId> = clients
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| run.ledger.claim(id))
            .collect();
        let direct_clients: Vec<Account> = stream::iter(unattached)
            .map(|account_id| self.describe_direct_client(run, initial, account_id))
            .buffered(self.concurrency())
            .collect()
            .await;
        for account in direct_clients {
            run.ledger.record_node(account);
        }

        Ok(())
    }

    async fn describe_direct_client(
        &self,
        run: &RunContext<'_>,
        initial: &CredentialContext,
        account_id: AccountId,
    ) -> Account {
        let details = match self
            .call(
                run,
                "fetch_account_details",
                &account_id,
                self.directory.fetch_account_details(initial, &account_id),
            )
            .await
        {
            Some(Ok(details)) => details,
            Some(Err(e)) => {
                self.record_branch_failure(run, initial, &account_id, &e);
                AccountDetails::placeholder()
            }
            None => AccountDetails::placeholder(),
        };
        Account::from_details(
            account_id.clone(),
            details,
            0,
            account_id,
            AccessLevel::DirectAccess,
        )
    }

    async fn expand_all(&self, run: &RunContext<'_>, tasks: Vec<Expansion>) {
        if self.concurrency() == 1 {
            for task in tasks {
                self.expand(run, task).await;
            }
        } else {
            stream::iter(tasks)
                .for_each_concurrent(self.concurrency(), |task| self.expand(run, task))
                .await;
        }
    }

    /// Expands one account: claim, describe, then recurse into its clients.
    fn expand<'a>(&'a self, run: &'a RunContext<'_>, task: Expansion) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Expansion {
                account_id,
                context,
                depth,
                discovered_via,
                listed_as_manager,
                prefetched,
            } = task;

            if depth > self.config.max_depth {
                return;
            }
            if !run.ledger.claim(&account_id) {
                debug!(
                    run_id = %run.run_id,
                    account_id = %account_id,
                    via = %discovered_via,
                    "Account already discovered, keeping first attribution"
                );
                return;
            }

            let access_level = if run.ledger.is_direct(&account_id) {
                AccessLevel::DirectAccess
            } else {
                AccessLevel::ViaManager
            };
            let placeholder = |access_level| {
                Account::from_details(
                    account_id.clone(),
                    AccountDetails::placeholder(),
                    depth,
                    discovered_via.clone(),
                    access_level,
                )
            };
            let unreachable_level = match access_level {
                AccessLevel::DirectAccess => AccessLevel::DirectAccess,
                _ => AccessLevel::Unknown,
            };

            let details = match prefetched {
                Some(details) => Some(details),
                None => {
                    match self
                        .call(
                            run,
                            "fetch_account_details",
                            &account_id,
                            self.directory.fetch_account_details(&context, &account_id),
                        )
                        .await
                    {
                        Some(Ok(details)) => Some(details),
                        Some(Err(e)) => {
                            run.ledger.record_node(placeholder(unreachable_level));
                            self.record_branch_failure(run, &context, &account_id, &e);
                            return;
                        }
                        None => None,
                    }
                }
            };
            let Some(mut details) = details else {
                // Out of budget: keep the id, skip the rest of the branch.
                run.ledger.record_node(placeholder(unreachable_level));
                return;
            };

            details.is_manager |= listed_as_manager;
            let is_manager = details.is_manager;
            run.ledger.record_node(Account::from_details(
                account_id.clone(),
                details,
                depth,
                discovered_via,
                access_level,
            ));

            if !is_manager {
                return;
            }
            if depth >= self.config.max_depth {
                debug!(
                    run_id = %run.run_id,
                    account_id = %account_id,
                    depth,
                    "Depth limit reached, not listing clients"
                );
                run.ledger.record_depth_cutoff();
                return;
            }

            let children = match self
                .call(
                    run,
                    "list_children",
                    &account_id,
                    self.config
                        .lister
                        .list_children(self.directory.as_ref(), &context, &account_id),
                )
                .await
            {
                Some(Ok(children)) => children,
                Some(Err(e)) => {
                    self.record_branch_failure(run, &context, &account_id, &e);
                    return;
                }
                None => return,
            };

            debug!(
                run_id = %run.run_id,
                account_id = %account_id,
                acting_as = context.login_customer_id().unwrap_or("-"),
                depth,
                children = children.len(),
                "Listed clients"
            );

            let tasks = children
                .into_iter()
                .map(|child| Expansion {
                    context: context.for_child(&child),
                    depth: depth + 1,
                    discovered_via: account_id.clone(),
                    listed_as_manager: child.is_manager,
                    prefetched: child.details,
                    account_id: child.id,
                })
                .collect();
            self.expand_all(run, tasks).await;
        })
    }

    /// Issues one directory call under the per-call timeout, clipped to what
    /// is left of the run budget. `None` means the run is stopping and the
    /// call was not made or was abandoned.
    async fn call<T, F>(
        &self,
        run: &RunContext<'_>,
        operation: &'static str,
        account_id: &str,
        request: F,
    ) -> Option<DirectoryResult<T>>
    where
        F: Future<Output = DirectoryResult<T>>,
    {
        if run.should_stop() {
            run.ledger.mark_cancelled();
            return None;
        }
        let Ok(_permit) = run.permits.acquire().await else {
            return None;
        };
        if run.should_stop() {
            run.ledger.mark_cancelled();
            return None;
        }

        let remaining = run.deadline.saturating_duration_since(Instant::now());
        let limit = self.config.call_timeout.min(remaining);
        match tokio::time::timeout(limit, request).await {
            Ok(result) => Some(result),
            Err(_) if limit < self.config.call_timeout => {
                run.ledger.mark_cancelled();
                None
            }
            Err(_) => Some(Err(DirectoryError::Unavailable(format!(
                "{operation} for {account_id} timed out after {}ms",
                self.config.call_timeout.as_millis()
            )))),
        }
    }

    fn record_branch_failure(
        &self,
        run: &RunContext<'_>,
        context: &CredentialContext,
        account_id: &str,
        error: &DirectoryError,
    ) {
        let acting_as = context.login_customer_id().unwrap_or("-");
        match error {
            DirectoryError::NotFound(_) => warn!(
                run_id = %run.run_id,
                account_id,
                acting_as,
                error = %error,
                "Account not found under acting-as identity, skipping branch"
            ),
            DirectoryError::Unavailable(_) => warn!(
                run_id = %run.run_id,
                account_id,
                acting_as,
                error = %error,
                "Directory unavailable while expanding account, skipping branch"
            ),
        }
        run.ledger.record_failure(account_id, error);
    }
}

fn dedup_preserving_order(ids: Vec<AccountId>) -> Vec<AccountId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_in_depth_and_lister() {
        let deep = TraversalConfig::deep();
        assert_eq!(deep.max_depth, 10);
        assert_eq!(deep.lister.name(), "per-child-lookup");

        let flat = TraversalConfig::flat();
        assert_eq!(flat.max_depth, 1);
        assert_eq!(flat.lister.name(), "inline-listing");
        assert_eq!(flat.run_budget, DEFAULT_RUN_BUDGET);
    }

    #[test]
    fn settings_map_onto_config() {
        let settings = TraversalSettings {
            strategy: TraversalStrategy::Flat,
            max_depth: Some(2),
            run_budget_ms: 1_500,
            call_timeout_ms: 250,
            max_concurrency: 0,
        };
        let config = TraversalConfig::from_settings(&settings);
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.run_budget, Duration::from_millis(1_500));
        assert_eq!(config.call_timeout, Duration::from_millis(250));
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.lister.name(), "inline-listing");
    }

    #[test]
    fn visible_ids_are_deduplicated_in_order() {
        let ids = vec!["3".to_string(), "1".to_string(), "3".to_string()];
        assert_eq!(dedup_preserving_order(ids), vec!["3", "1"]);
    }
}
