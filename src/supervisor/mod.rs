//! Background maintenance loops.
//!
//! Two independent loops walk the registry: the presence cycler on a
//! jittered schedule, the health monitor on a fixed one. Neither lets a
//! single account's failure stop the walk for the others.

pub mod health;
pub mod presence;

pub use health::HealthMonitor;
pub use presence::PresenceCycler;

use tracing::{debug, warn};

use crate::activity::ActivityLog;
use crate::error::TransportError;
use crate::session::SessionRegistry;
use crate::settings::{AccountDirectory, AccountId};

/// Shared per-account error policy for the loops and the dispatcher.
///
/// Authorization failures remove the session and surface once through the
/// activity sink; transient and benign errors are absorbed; everything else
/// is logged and the operation abandoned for this account only.
pub(crate) async fn react_to_account_error(
    registry: &SessionRegistry,
    directory: &dyn AccountDirectory,
    activity: &dyn ActivityLog,
    account: AccountId,
    context: &'static str,
    error: &TransportError,
) {
    if error.is_auth() {
        let owner = directory.owner_of(account).await;
        registry.remove_unauthorized(account).await;
        if let Err(e) = activity
            .log_auth_failure(owner, account, &error.to_string())
            .await
        {
            warn!(account = %account, error = %e, "Auth-failure record delivery failed");
        }
    } else if error.is_transient() {
        debug!(account = %account, context, error = %error, "Transient transport error, retrying next tick");
    } else if error.is_benign() {
        debug!(account = %account, context, error = %error, "Benign peer error, ignoring");
    } else {
        warn!(account = %account, context, error = %error, "Unclassified error, skipping account");
    }
}
