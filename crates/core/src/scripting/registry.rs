//! The script registry: per-name serialized mutations over published snapshots.
//!
//! Each name maps to a [`Slot`] carrying an async mutex (the per-name
//! serialization point) and the currently published state. Mutations take
//! the slot's mutex, write through to the [`ScriptStore`], and only then swap
//! the published `Arc<ScriptSnapshot>`. Readers clone the `Arc` under a
//! short-lived lock and never wait on a pending mutation.
//!
//! Soft-deleted names stay in the map as tombstones: hidden from reads but
//! still reserved, until a forced delete removes them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::document::{Activation, ScriptDocument, ScriptSnapshot, ScriptStatus};
use super::engine::{EngineError, EngineSet};
use super::store::{ScriptQuery, ScriptRecord, ScriptStore};
use super::validation::{self, ScriptDraft, ValidationError};
use crate::error::CoreError;

/// Default upper bound on a compile check.
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryPolicy {
    /// `active` for documents created without one.
    pub default_active: bool,
    /// Bound on an engine's compile check.
    pub compile_timeout: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            default_active: true,
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }
}

#[derive(Debug)]
enum SlotState {
    Vacant,
    Live(Arc<ScriptSnapshot>),
    Deleted(Arc<ScriptSnapshot>),
}

#[derive(Debug)]
struct Slot {
    gate: Arc<Mutex<()>>,
    state: RwLock<SlotState>,
}

impl Slot {
    fn new(state: SlotState) -> Self {
        Self {
            gate: Arc::new(Mutex::new(())),
            state: RwLock::new(state),
        }
    }

    fn live(&self) -> Option<Arc<ScriptSnapshot>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SlotState::Live(snapshot) => Some(Arc::clone(snapshot)),
            _ => None,
        }
    }

    fn is_vacant(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            SlotState::Vacant
        )
    }

    fn publish(&self, state: SlotState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Exclusive hold on one name. Dropping it releases the name and removes
/// the slot from the map if it ended up vacant.
struct NameLock<'a> {
    registry: &'a ScriptRegistry,
    name: String,
    slot: Arc<Slot>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for NameLock<'_> {
    fn drop(&mut self) {
        if !self.slot.is_vacant() {
            return;
        }
        let mut slots = self.registry.write_slots();
        if slots
            .get(&self.name)
            .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
        {
            slots.remove(&self.name);
        }
    }
}

/// Authoritative in-memory view of all scripts, written through to a store.
pub struct ScriptRegistry {
    store: Arc<dyn ScriptStore>,
    engines: Arc<EngineSet>,
    policy: RegistryPolicy,
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRegistry")
            .field("engines", &self.engines)
            .field("policy", &self.policy)
            .field("names", &self.read_slots().len())
            .finish()
    }
}

impl ScriptRegistry {
    /// Build the registry from every record in `store`.
    ///
    /// Records whose language has no engine in `engines`, or whose code no
    /// longer decodes, are loaded as tombstones: reserved, never executable,
    /// removable with [`force_delete`](Self::force_delete).
    pub async fn open(
        store: Arc<dyn ScriptStore>,
        engines: Arc<EngineSet>,
        policy: RegistryPolicy,
    ) -> Result<Self, CoreError> {
        let records = store.load_all().await?;

        let mut slots = HashMap::with_capacity(records.len());
        let mut live = 0usize;
        for record in records {
            let name = record.document.name.clone();
            let state = hydrate(&engines, record);
            if matches!(state, SlotState::Live(_)) {
                live += 1;
            }
            slots.insert(name, Arc::new(Slot::new(state)));
        }

        tracing::info!(
            live,
            tombstoned = slots.len() - live,
            languages = ?engines.languages(),
            "Script registry loaded"
        );

        Ok(Self {
            store,
            engines,
            policy,
            slots: RwLock::new(slots),
        })
    }

    pub fn engines(&self) -> &Arc<EngineSet> {
        &self.engines
    }

    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    /// Validate, compile and persist a new script at version 0.
    pub async fn create(&self, body: Option<&Value>) -> Result<ScriptStatus, CoreError> {
        let draft = validation::validate_document(body, &self.engines)?;
        if self.is_taken(&draft.name) {
            return Err(CoreError::AlreadyExists { name: draft.name });
        }
        self.compile(&draft).await?;

        // Re-checked under the lock; a racing create may have won.
        let lock = self.lock_name(&draft.name).await;
        if !lock.slot.is_vacant() {
            return Err(CoreError::AlreadyExists { name: draft.name });
        }

        let now = Utc::now();
        let document = ScriptDocument {
            name: draft.name,
            code: draft.code,
            language: draft.language,
            encoding: draft.encoding,
            active: draft.active.unwrap_or(self.policy.default_active),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.put(&document).await?;
        lock.slot.publish(SlotState::Live(Arc::new(ScriptSnapshot {
            document: document.clone(),
            source: draft.source,
        })));

        tracing::info!(
            script = %document.name,
            lang = %document.language,
            active = document.active,
            "Script created"
        );
        Ok(ScriptStatus {
            message: format!("Script '{}' created", document.name),
            document,
        })
    }

    /// Merge `patch` onto the live script, recompile and persist it as the
    /// next version. `active` is left as it is.
    ///
    /// A numeric `version` in the patch must match the current version.
    pub async fn update(&self, name: &str, patch: Option<&Value>) -> Result<ScriptStatus, CoreError> {
        let lock = self.lock_name(name).await;
        let current = lock.slot.live().ok_or_else(|| CoreError::not_found(name))?;

        if let Some(expected) = patch
            .and_then(|p| p.get(validation::VERSION))
            .and_then(Value::as_i64)
        {
            if expected != current.version() {
                return Err(CoreError::VersionConflict {
                    name: name.to_string(),
                    expected,
                    actual: current.version(),
                });
            }
        }

        let merged = validation::merge_patch(&current.document, patch)?;
        let draft = validation::validate_document(Some(&merged), &self.engines)?;
        if draft.name != current.name() {
            return Err(ValidationError::NameChanged.into());
        }
        self.compile(&draft).await?;

        let document = ScriptDocument {
            name: current.document.name.clone(),
            code: draft.code,
            language: draft.language,
            encoding: draft.encoding,
            active: current.document.active,
            version: current.version() + 1,
            created_at: current.document.created_at,
            updated_at: Utc::now(),
        };
        self.store.put(&document).await?;
        lock.slot.publish(SlotState::Live(Arc::new(ScriptSnapshot {
            document: document.clone(),
            source: draft.source,
        })));

        tracing::info!(
            script = %document.name,
            version = document.version,
            lang = %document.language,
            "Script updated"
        );
        Ok(ScriptStatus {
            message: format!(
                "Script '{}' updated to version {}",
                document.name, document.version
            ),
            document,
        })
    }

    /// Set the `active` flag. Only an actual change is persisted.
    pub async fn activate(&self, name: &str, active: bool) -> Result<Activation, CoreError> {
        let lock = self.lock_name(name).await;
        let Some(current) = lock.slot.live() else {
            return Ok(Activation::NotFound);
        };
        if current.is_active() == active {
            return Ok(Activation::NoOp);
        }

        let mut document = current.document.clone();
        document.active = active;
        document.updated_at = Utc::now();
        self.store.put(&document).await?;
        lock.slot.publish(SlotState::Live(Arc::new(ScriptSnapshot {
            document,
            source: current.source.clone(),
        })));

        tracing::info!(script = %name, active, "Script activation changed");
        Ok(Activation::Changed)
    }

    /// The currently published live snapshot for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<ScriptSnapshot>> {
        self.read_slots().get(name).and_then(|slot| slot.live())
    }

    /// Scripts matching `query`, resolved to their published snapshots.
    pub async fn list(&self, query: &ScriptQuery) -> Result<Vec<Arc<ScriptSnapshot>>, CoreError> {
        let documents = self.store.list_matching(query).await?;
        Ok(documents
            .iter()
            .filter_map(|doc| self.get(&doc.name))
            .filter(|snapshot| query.matches(&snapshot.document))
            .collect())
    }

    /// Soft delete. `false` if there was no live script to delete.
    pub async fn delete(&self, name: &str) -> Result<bool, CoreError> {
        let lock = self.lock_name(name).await;
        let Some(current) = lock.slot.live() else {
            return Ok(false);
        };

        if !self.store.soft_delete(name).await? {
            tracing::warn!(script = %name, "Store had no live record to soft delete");
        }
        lock.slot.publish(SlotState::Deleted(current));

        tracing::info!(script = %name, "Script deleted");
        Ok(true)
    }

    /// Hard delete, live or tombstoned. Frees the name for reuse.
    pub async fn force_delete(&self, name: &str) -> Result<bool, CoreError> {
        let lock = self.lock_name(name).await;
        let known = !lock.slot.is_vacant();

        let removed = self.store.hard_delete(name).await?;
        lock.slot.publish(SlotState::Vacant);

        let deleted = known || removed;
        if deleted {
            tracing::info!(script = %name, "Script force deleted");
        }
        Ok(deleted)
    }

    async fn compile(&self, draft: &ScriptDraft) -> Result<(), CoreError> {
        let engine = self.engines.get(draft.language).ok_or_else(|| {
            CoreError::Internal(format!("no engine registered for '{}'", draft.language))
        })?;

        match tokio::time::timeout(self.policy.compile_timeout, engine.validate(&draft.source)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(EngineError::Timeout { elapsed_ms })) => Err(CoreError::Compile(format!(
                "Compilation timed out after {elapsed_ms}ms"
            ))),
            Ok(Err(e)) => Err(CoreError::from_engine(&draft.name, e)),
            Err(_) => Err(CoreError::Compile(format!(
                "Compilation timed out after {}ms",
                self.policy.compile_timeout.as_millis()
            ))),
        }
    }

    /// Acquire the per-name mutex, creating a vacant slot if needed.
    ///
    /// A slot can be retired while we wait for it; in that case the lock is
    /// retaken on whatever slot is current.
    async fn lock_name(&self, name: &str) -> NameLock<'_> {
        loop {
            let existing = self.read_slots().get(name).cloned();
            let slot = match existing {
                Some(slot) => slot,
                None => Arc::clone(
                    self.write_slots()
                        .entry(name.to_string())
                        .or_insert_with(|| Arc::new(Slot::new(SlotState::Vacant))),
                ),
            };

            let guard = Arc::clone(&slot.gate).lock_owned().await;

            let current = self
                .read_slots()
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(current, &slot));
            if current {
                return NameLock {
                    registry: self,
                    name: name.to_string(),
                    slot,
                    _guard: guard,
                };
            }
        }
    }

    /// Lock-free check: the name is live or tombstoned.
    fn is_taken(&self, name: &str) -> bool {
        self.read_slots()
            .get(name)
            .is_some_and(|slot| !slot.is_vacant())
    }

    fn read_slots(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Slot>>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Slot>>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn hydrate(engines: &EngineSet, record: ScriptRecord) -> SlotState {
    let ScriptRecord { document, deleted } = record;
    let decoded = validation::decode_source(&document.code, document.encoding);
    let supported = engines.supports(document.language);

    if !deleted && !supported {
        tracing::warn!(
            script = %document.name,
            lang = %document.language,
            "No engine for stored script, loading as deleted"
        );
    }
    if let (false, Err(e)) = (deleted, &decoded) {
        tracing::warn!(script = %document.name, error = %e, "Stored script does not decode, loading as deleted");
    }

    let tombstone = deleted || !supported || decoded.is_err();
    let source = decoded.unwrap_or_else(|_| document.code.clone());
    let snapshot = Arc::new(ScriptSnapshot { document, source });
    if tombstone {
        SlotState::Deleted(snapshot)
    } else {
        SlotState::Live(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
