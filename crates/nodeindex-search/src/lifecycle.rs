//! Index lifecycle: alias swap and stale index cleanup.
//!
//! Clients query a logical name, the alias `A`. Each full rebuild writes a
//! new physical index `A-<postfix>` outside the alias. Once it is populated,
//! [`IndexLifecycleManager::update_alias`] retargets `A` to it in one atomic
//! request, and [`IndexLifecycleManager::remove_old_indices`] deletes every
//! `A-*` index the alias no longer references.
//!
//! A rebuild abandoned before the swap leaves its candidate behind as a stale
//! index; the next cleanup reclaims it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{AliasAction, SearchEngine};
use crate::error::SearchError;

/// Result of a successful alias swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasUpdate {
    pub alias: String,
    /// Index the alias now points to
    pub index: String,
    /// Indices the alias was removed from
    pub removed: Vec<String>,
}

/// Where the alias and its physical indices stand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The alias points nowhere.
    NoActiveIndex,
    /// The alias is live but unreferenced `A-*` indices remain.
    StaleIndicesPending,
    /// The alias is live and nothing is left to clean up.
    Clean,
}

/// Snapshot of the alias and its indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStatus {
    pub alias: String,
    /// Indices the alias points to
    pub live: Vec<String>,
    /// `A-*` indices the alias does not point to
    pub stale: Vec<String>,
}

impl LifecycleStatus {
    pub fn state(&self) -> LifecycleState {
        if self.live.is_empty() {
            LifecycleState::NoActiveIndex
        } else if !self.stale.is_empty() {
            LifecycleState::StaleIndicesPending
        } else {
            LifecycleState::Clean
        }
    }
}

/// Manages the physical indices behind one alias.
#[derive(Clone)]
pub struct IndexLifecycleManager {
    engine: Arc<dyn SearchEngine>,
    alias: String,
}

impl std::fmt::Debug for IndexLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLifecycleManager")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl IndexLifecycleManager {
    pub fn new(engine: Arc<dyn SearchEngine>, alias: impl Into<String>) -> Self {
        Self {
            engine,
            alias: alias.into(),
        }
    }

    /// The alias clients query against.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Physical index name for `postfix`. An empty postfix yields the bare alias.
    pub fn index_name(&self, postfix: &str) -> String {
        if postfix.is_empty() {
            self.alias.clone()
        } else {
            format!("{}-{}", self.alias, postfix)
        }
    }

    /// Postfix for a new rebuild: the current Unix timestamp.
    pub fn new_postfix() -> String {
        Utc::now().timestamp().to_string()
    }

    fn index_prefix(&self) -> String {
        format!("{}-", self.alias)
    }

    fn require_postfixed(&self, index: &str) -> Result<(), SearchError> {
        if index == self.alias {
            return Err(SearchError::Precondition(format!(
                "index name `{index}` equals the alias name; a non-empty postfix is required"
            )));
        }
        Ok(())
    }

    /// Create the physical index for `postfix` outside the alias.
    ///
    /// `settings` is passed to the search engine as the index creation body.
    pub async fn create_candidate(&self, postfix: &str, settings: &Value) -> Result<String, SearchError> {
        let index = self.index_name(postfix);
        self.require_postfixed(&index)?;

        if self.engine.index_exists(&index).await? {
            return Err(SearchError::Precondition(format!(
                "candidate index `{index}` already exists"
            )));
        }

        self.engine.create_index(&index, settings).await?;
        info!(alias = %self.alias, index = %index, "Created candidate index");
        Ok(index)
    }

    /// Point the alias at `A-<postfix>` and away from every other index.
    ///
    /// Fails with [`SearchError::Precondition`] without touching the alias if
    /// the postfix is empty, the candidate does not exist, or a concrete index
    /// carries the alias's name. Repeating a successful call is harmless.
    pub async fn update_alias(&self, postfix: &str) -> Result<AliasUpdate, SearchError> {
        let index = self.index_name(postfix);
        self.require_postfixed(&index)?;

        let indices = self.engine.list_indices().await?;
        if indices.iter().any(|name| *name == self.alias) {
            return Err(SearchError::Precondition(format!(
                "a concrete index named `{}` exists; it must be removed before the alias can be created",
                self.alias
            )));
        }
        if !indices.contains(&index) {
            return Err(SearchError::Precondition(format!(
                "candidate index `{index}` does not exist"
            )));
        }

        let removed: Vec<String> = self
            .engine
            .alias_targets(&self.alias)
            .await?
            .into_iter()
            .filter(|target| *target != index)
            .collect();

        let mut actions: Vec<AliasAction> = removed
            .iter()
            .map(|target| AliasAction::Remove {
                index: target.clone(),
                alias: self.alias.clone(),
            })
            .collect();
        actions.push(AliasAction::Add {
            index: index.clone(),
            alias: self.alias.clone(),
        });

        self.engine.update_aliases(&actions).await?;
        info!(
            alias = %self.alias,
            index = %index,
            removed = ?removed,
            "Alias updated"
        );

        Ok(AliasUpdate {
            alias: self.alias.clone(),
            index,
            removed,
        })
    }

    /// Current alias targets and stale `A-*` indices.
    pub async fn status(&self) -> Result<LifecycleStatus, SearchError> {
        let live: BTreeSet<String> = self.engine.alias_targets(&self.alias).await?.into_iter().collect();
        let prefix = self.index_prefix();
        let stale = self
            .engine
            .list_indices()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(&prefix) && !live.contains(name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(LifecycleStatus {
            alias: self.alias.clone(),
            live: live.into_iter().collect(),
            stale,
        })
    }

    /// Delete every `A-*` index the alias does not point to.
    ///
    /// Returns the deleted names. Nothing stale means no request and an empty list.
    pub async fn remove_old_indices(&self) -> Result<Vec<String>, SearchError> {
        let status = self.status().await?;
        if status.stale.is_empty() {
            debug!(alias = %self.alias, "No stale indices to remove");
            return Ok(Vec::new());
        }

        self.engine.delete_indices(&status.stale).await?;
        info!(
            alias = %self.alias,
            removed = ?status.stale,
            "Removed stale indices"
        );
        Ok(status.stale)
    }
}
