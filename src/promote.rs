use sqlx::SqlitePool;
use tracing::info;

use crate::error::{MigrateError, MigrateResult};
use crate::migrate::MigrationEvent;
use crate::permissions::Permission;
use crate::schema::has_column;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedAccountPolicy {
    pub enabled: bool,
    /// Username of the account that must hold `required_level`.
    pub account: Option<String>,
    pub required_level: i64,
}

impl PrivilegedAccountPolicy {
    pub fn disabled() -> Self {
        PrivilegedAccountPolicy {
            enabled: false,
            account: None,
            required_level: Permission::Superadmin.level(),
        }
    }

    pub fn superadmin(account: impl Into<String>) -> Self {
        PrivilegedAccountPolicy {
            enabled: true,
            account: Some(account.into()),
            required_level: Permission::Superadmin.level(),
        }
    }
}

impl Default for PrivilegedAccountPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Make sure the configured account holds the required permission level.
/// Returns whether the account was (or, with `dry_run`, would be) updated.
pub async fn promote_account(
    pool: &SqlitePool,
    policy: &PrivilegedAccountPolicy,
    dry_run: bool,
    on_event: &(dyn Fn(&MigrationEvent) + Send + Sync),
) -> MigrateResult<bool> {
    if !policy.enabled {
        return Ok(false);
    }

    let account = policy
        .account
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| {
            MigrateError::configuration(
                "superadmin promotion is enabled but \"superadminAccount\" is not set",
            )
        })?;

    let lookup = if has_column(pool, "users", "permission").await? {
        "SELECT permission FROM users WHERE username = ?1 LIMIT 2"
    } else {
        // Only reachable in a dry run, before the column exists.
        "SELECT NULL FROM users WHERE username = ?1 LIMIT 2"
    };
    let matches: Vec<Option<i64>> = sqlx::query_scalar(lookup)
        .bind(account)
        .fetch_all(pool)
        .await
        .map_err(MigrateError::connectivity)?;

    let current = match matches.as_slice() {
        [] => return Err(MigrateError::AccountNotFound(account.to_string())),
        [current] => *current,
        _ => {
            return Err(MigrateError::configuration(format!(
                "superadmin account \"{account}\" matches more than one user"
            )))
        }
    };

    if current == Some(policy.required_level) {
        info!(
            target: "safekeep",
            event = "account_already_privileged",
            account = %account,
            level = policy.required_level
        );
        return Ok(false);
    }

    if !dry_run {
        sqlx::query("UPDATE users SET permission = ?1 WHERE username = ?2")
            .bind(policy.required_level)
            .bind(account)
            .execute(pool)
            .await
            .map_err(MigrateError::connectivity)?;
    }

    info!(
        target: "safekeep",
        event = "account_promoted",
        account = %account,
        from = ?current,
        to = policy.required_level,
        dry_run
    );
    on_event(&MigrationEvent::AccountPromoted {
        account: account.to_string(),
        level: policy.required_level,
    });
    Ok(true)
}
