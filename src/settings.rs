//! Account settings and directory traits.
//!
//! Accounts are owned by external settings management; this crate only
//! reads them. Both traits are implemented by the embedding process over
//! whatever storage it uses.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// One externally linked chat account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The user who owns an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Auto-reply configuration for one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSettings {
    pub dm_enabled: bool,
    pub dm_message: Option<String>,
    pub groups_enabled: bool,
    pub groups_message: Option<String>,
}

impl AccountSettings {
    /// True when either reply surface is switched on.
    pub fn any_enabled(&self) -> bool {
        self.dm_enabled || self.groups_enabled
    }

    /// Direct-message replies are enabled with usable text.
    pub fn dm_active(&self) -> Option<&str> {
        active_text(self.dm_enabled, self.dm_message.as_deref())
    }

    /// Group replies are enabled with usable text.
    pub fn groups_active(&self) -> Option<&str> {
        active_text(self.groups_enabled, self.groups_message.as_deref())
    }
}

fn active_text(enabled: bool, text: Option<&str>) -> Option<&str> {
    match text {
        Some(t) if enabled && !t.trim().is_empty() => Some(t),
        _ => None,
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Read access to per-account auto-reply settings.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Settings for the account, or `None` when the account is unknown.
    async fn account_settings(&self, account: AccountId) -> Option<AccountSettings>;
}

/// Read access to the fleet of managed accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Accounts with at least one auto-reply flag enabled.
    async fn accounts_with_auto_reply(&self) -> Vec<AccountId>;

    /// Owner lookup, or `None` when the account is unknown.
    async fn owner_of(&self, account: AccountId) -> Option<UserId>;
}
