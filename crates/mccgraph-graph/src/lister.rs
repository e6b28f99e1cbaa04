//! Child listing strategies.
//!
//! The engine never decides how a manager's clients are fetched; it asks an
//! injected [`ChildLister`]. Both listers issue exactly one directory call per
//! manager and only hand back enabled accounts.

use async_trait::async_trait;
use mccgraph_core::{
    AccountDirectory, AccountStatus, ChildAccount, CredentialContext, DirectoryResult,
};

#[async_trait]
pub trait ChildLister: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_children(
        &self,
        directory: &dyn AccountDirectory,
        ctx: &CredentialContext,
        manager_id: &str,
    ) -> DirectoryResult<Vec<ChildAccount>>;
}

/// Drops inline display attributes so every child gets its own detail
/// lookup under the identity that will expand it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerChildLookup;

#[async_trait]
impl ChildLister for PerChildLookup {
    fn name(&self) -> &'static str {
        "per-child-lookup"
    }

    async fn list_children(
        &self,
        directory: &dyn AccountDirectory,
        ctx: &CredentialContext,
        manager_id: &str,
    ) -> DirectoryResult<Vec<ChildAccount>> {
        let children = directory.list_immediate_children(ctx, manager_id).await?;
        Ok(enabled_only(children)
            .map(|mut child| {
                child.details = None;
                child
            })
            .collect())
    }
}

/// Keeps whatever display attributes the listing carried, so a child with
/// inline details costs no further call.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineListing;

#[async_trait]
impl ChildLister for InlineListing {
    fn name(&self) -> &'static str {
        "inline-listing"
    }

    async fn list_children(
        &self,
        directory: &dyn AccountDirectory,
        ctx: &CredentialContext,
        manager_id: &str,
    ) -> DirectoryResult<Vec<ChildAccount>> {
        let children = directory.list_immediate_children(ctx, manager_id).await?;
        Ok(enabled_only(children)
            .map(|mut child| {
                // The listing's manager flag is what drives identity switching,
                // keep the inline copy consistent with it.
                if let Some(details) = child.details.as_mut() {
                    details.is_manager = child.is_manager;
                }
                child
            })
            .collect())
    }
}

fn enabled_only(children: Vec<ChildAccount>) -> impl Iterator<Item = ChildAccount> {
    children
        .into_iter()
        .filter(|child| child.status == AccountStatus::Enabled)
}
