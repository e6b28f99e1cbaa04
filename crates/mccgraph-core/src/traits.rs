use crate::{AccountDetails, AccountId, ChildAccount, CredentialContext, DirectoryResult};
use async_trait::async_trait;
use std::sync::Arc;

/// The remote account API as seen by the traversal.
///
/// Every call takes an explicit credential context; the login customer on
/// that context decides whose access grants authorize the request.
/// Implementations own retries, the traversal never retries.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Accounts the credential can see without any acting-as override.
    async fn list_directly_visible_accounts(
        &self,
        ctx: &CredentialContext,
    ) -> DirectoryResult<Vec<AccountId>>;

    async fn is_manager(&self, ctx: &CredentialContext, account_id: &str) -> DirectoryResult<bool>;

    async fn fetch_account_details(
        &self,
        ctx: &CredentialContext,
        account_id: &str,
    ) -> DirectoryResult<AccountDetails>;

    /// One level of a manager's client list, in remote order.
    async fn list_immediate_children(
        &self,
        ctx: &CredentialContext,
        account_id: &str,
    ) -> DirectoryResult<Vec<ChildAccount>>;
}

#[async_trait]
impl<T: AccountDirectory + ?Sized> AccountDirectory for Arc<T> {
    async fn list_directly_visible_accounts(
        &self,
        ctx: &CredentialContext,
    ) -> DirectoryResult<Vec<AccountId>> {
        (**self).list_directly_visible_accounts(ctx).await
    }

    async fn is_manager(&self, ctx: &CredentialContext, account_id: &str) -> DirectoryResult<bool> {
        (**self).is_manager(ctx, account_id).await
    }

    async fn fetch_account_details(
        &self,
        ctx: &CredentialContext,
        account_id: &str,
    ) -> DirectoryResult<AccountDetails> {
        (**self).fetch_account_details(ctx, account_id).await
    }

    async fn list_immediate_children(
        &self,
        ctx: &CredentialContext,
        account_id: &str,
    ) -> DirectoryResult<Vec<ChildAccount>> {
        (**self).list_immediate_children(ctx, account_id).await
    }
}
