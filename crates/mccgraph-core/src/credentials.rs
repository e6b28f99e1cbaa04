//! Credential bundle and the acting-as ("login customer") context every
//! directory call carries.

use crate::{normalize_customer_id, AccountId, ChildAccount, HierarchyError, Result};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;

/// OAuth client secrets plus the platform developer token.
pub struct Credentials {
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
    developer_token: SecretString,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        developer_token: impl Into<String>,
    ) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        let refresh_token = refresh_token.into();
        let developer_token = developer_token.into();

        for (field, value) in [
            ("client_id", &client_id),
            ("client_secret", &client_secret),
            ("refresh_token", &refresh_token),
            ("developer_token", &developer_token),
        ] {
            if value.trim().is_empty() {
                return Err(HierarchyError::SetupFailure(format!(
                    "credential field '{field}' is empty"
                )));
            }
        }

        Ok(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            refresh_token: SecretString::from(refresh_token),
            developer_token: SecretString::from(developer_token),
        })
    }

    /// Builds credentials from already-wrapped secrets (e.g. loaded config).
    pub fn from_secrets(
        client_id: impl Into<String>,
        client_secret: &SecretString,
        refresh_token: &SecretString,
        developer_token: &SecretString,
    ) -> Result<Self> {
        Self::new(
            client_id,
            client_secret.expose_secret(),
            refresh_token.expose_secret(),
            developer_token.expose_secret(),
        )
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    pub fn developer_token(&self) -> &SecretString {
        &self.developer_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("developer_token", &"[REDACTED]")
            .finish()
    }
}

/// Immutable credential bundle plus an optional acting-as account.
///
/// Switching identity clones an `Arc`, nothing is contacted until a
/// directory call is made with the new context.
#[derive(Debug, Clone)]
pub struct CredentialContext {
    credentials: Arc<Credentials>,
    login_customer_id: Option<AccountId>,
}

impl CredentialContext {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            login_customer_id: None,
        }
    }

    /// Context with an operator-supplied login customer. The id may use the
    /// `xxx-xxx-xxxx` display form but must be numeric once normalized.
    pub fn with_login_customer(credentials: Credentials, login_customer_id: &str) -> Result<Self> {
        let normalized = normalize_customer_id(login_customer_id);
        if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_digit()) {
            return Err(HierarchyError::SetupFailure(format!(
                "login customer id '{login_customer_id}' is not a numeric account id"
            )));
        }
        Ok(Self {
            credentials: Arc::new(credentials),
            login_customer_id: Some(normalized),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn login_customer_id(&self) -> Option<&str> {
        self.login_customer_id.as_deref()
    }

    /// Same secrets, requests authorized as `account_id`.
    pub fn acting_as(&self, account_id: &str) -> Self {
        Self {
            credentials: Arc::clone(&self.credentials),
            login_customer_id: Some(account_id.to_string()),
        }
    }

    /// Same secrets, no acting-as override.
    pub fn without_login_customer(&self) -> Self {
        Self {
            credentials: Arc::clone(&self.credentials),
            login_customer_id: None,
        }
    }

    /// Identity used to expand `child` when it was listed under the manager
    /// this context currently acts as. A manager's client list can only be
    /// read as that manager; a client has no grants of its own and stays
    /// under its parent's identity.
    pub fn for_child(&self, child: &ChildAccount) -> Self {
        if child.is_manager {
            self.acting_as(&child.id)
        } else {
            self.clone()
        }
    }

    pub fn shares_credentials_with(&self, other: &CredentialContext) -> bool {
        Arc::ptr_eq(&self.credentials, &other.credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("client", "secret", "refresh", "dev-token").unwrap()
    }

    #[test]
    fn empty_field_is_setup_failure() {
        let err = Credentials::new("client", "", "refresh", "dev").unwrap_err();
        assert!(matches!(err, HierarchyError::SetupFailure(ref m) if m.contains("client_secret")));
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", creds());
        assert!(rendered.contains("client"));
        assert!(!rendered.contains("refresh\""));
        assert!(!rendered.contains("dev-token"));
    }

    #[test]
    fn login_customer_is_normalized_and_validated() {
        let ctx = CredentialContext::with_login_customer(creds(), "123-456-7890").unwrap();
        assert_eq!(ctx.login_customer_id(), Some("1234567890"));

        let err = CredentialContext::with_login_customer(creds(), "abc").unwrap_err();
        assert!(matches!(err, HierarchyError::SetupFailure(_)));
    }

    #[test]
    fn acting_as_shares_secrets() {
        let base = CredentialContext::new(creds());
        let as_manager = base.acting_as("111");
        assert_eq!(as_manager.login_customer_id(), Some("111"));
        assert!(as_manager.shares_credentials_with(&base));
        assert_eq!(as_manager.without_login_customer().login_customer_id(), None);
    }

    #[test]
    fn child_identity_switches_only_for_managers() {
        let parent = CredentialContext::new(creds()).acting_as("100");

        let manager = ChildAccount::new("200", true);
        assert_eq!(parent.for_child(&manager).login_customer_id(), Some("200"));

        let client = ChildAccount::new("300", false);
        assert_eq!(parent.for_child(&client).login_customer_id(), Some("100"));
    }
}
