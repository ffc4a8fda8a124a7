//! Lock management for Strata.
//!
//! The [`LockManager`] keeps the bookkeeping of which transaction holds
//! which lock on which resource, and a single wait queue of requests that
//! could not be granted. It treats every resource as independent: a
//! request that only makes sense with intent locks on ancestors (an X lock
//! on a table while holding nothing on the database) is still granted
//! here. Hierarchy rules live in [`LockContext`].
//!
//! Blocking is bookkeeping, not thread suspension: a request that conflicts
//! marks its transaction blocked and waits in the queue until a release
//! makes it grantable. Callers poll [`LockManager::is_blocked`].

use crate::config::LockConfig;
use crate::context::{ContextArena, LockContext};
use crate::lock::{Lock, LockRequest};
use crate::lock_type::LockType;
use crate::strategy::{LockEvent, LockStrategy, Standard};
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use strata_core::{Error, ResourceName, Result, TransactionId};
use tracing::{debug, trace, warn};

/// Name of the root context.
pub const DATABASE: &str = "database";

pub(crate) fn violation(err: Error) -> Error {
    warn!(error = %err, "lock protocol violation");
    err
}

/// A change in the set of granted locks, consumed to keep child lock
/// counts current.
#[derive(Clone, Debug)]
pub(crate) enum TableChange {
    Granted(TransactionId, ResourceName),
    Removed(TransactionId, ResourceName),
}

/// Per-resource and per-transaction lock tables plus the wait queue.
#[derive(Debug, Default)]
pub(crate) struct LockTables {
    /// Holders of each resource, in acquisition order.
    resource_locks: HashMap<ResourceName, Vec<(TransactionId, LockType)>>,
    /// Locks of each transaction, in acquisition order.
    transaction_locks: HashMap<TransactionId, Vec<Lock>>,
    /// Requests that could not be granted yet.
    wait_queue: VecDeque<LockRequest>,
    /// Transactions with a queued request.
    blocked: HashSet<TransactionId>,
    /// Grants and removals not yet consumed.
    changes: Vec<TableChange>,
}

impl LockTables {
    pub fn lock_type(&self, txn: TransactionId, name: &ResourceName) -> Option<LockType> {
        self.resource_locks
            .get(name)?
            .iter()
            .find(|(holder, _)| *holder == txn)
            .map(|(_, lock_type)| *lock_type)
    }

    pub fn locks_on(&self, name: &ResourceName) -> Vec<(TransactionId, LockType)> {
        self.resource_locks.get(name).cloned().unwrap_or_default()
    }

    pub fn locks_held_by(&self, txn: TransactionId) -> &[Lock] {
        self.transaction_locks
            .get(&txn)
            .map(|locks| locks.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_blocked(&self, txn: TransactionId) -> bool {
        self.blocked.contains(&txn)
    }

    pub fn queued_on(&self, name: &ResourceName) -> Vec<(TransactionId, LockType)> {
        self.wait_queue
            .iter()
            .filter(|request| &request.lock.name == name)
            .map(|request| (request.txn, request.lock.lock_type))
            .collect()
    }

    pub fn take_changes(&mut self) -> Vec<TableChange> {
        std::mem::take(&mut self.changes)
    }

    /// Returns true if a transaction other than `txn` holds a lock on
    /// `name` that is incompatible with `lock_type`.
    fn conflicts(&self, txn: TransactionId, name: &ResourceName, lock_type: LockType) -> bool {
        self.resource_locks.get(name).map_or(false, |holders| {
            holders
                .iter()
                .any(|(holder, held)| *holder != txn && !held.is_compatible_with(lock_type))
        })
    }

    fn insert(&mut self, txn: TransactionId, lock: Lock) {
        trace!(txn_id = txn, resource = %lock.name, lock_type = %lock.lock_type, "lock granted");
        self.resource_locks
            .entry(lock.name.clone())
            .or_default()
            .push((txn, lock.lock_type));
        self.changes
            .push(TableChange::Granted(txn, lock.name.clone()));
        self.transaction_locks.entry(txn).or_default().push(lock);
    }

    /// Changes the type of a held lock without moving it in acquisition order.
    fn set_type(&mut self, txn: TransactionId, name: &ResourceName, lock_type: LockType) {
        if let Some(holders) = self.resource_locks.get_mut(name) {
            for (holder, held) in holders.iter_mut() {
                if *holder == txn {
                    *held = lock_type;
                }
            }
        }
        if let Some(locks) = self.transaction_locks.get_mut(&txn) {
            for lock in locks.iter_mut() {
                if &lock.name == name {
                    lock.lock_type = lock_type;
                }
            }
        }
    }

    /// Removes a held lock; returns false if there was none.
    fn remove(&mut self, txn: TransactionId, name: &ResourceName) -> bool {
        let Some(holders) = self.resource_locks.get_mut(name) else {
            return false;
        };
        let Some(pos) = holders.iter().position(|(holder, _)| *holder == txn) else {
            return false;
        };
        holders.remove(pos);
        if holders.is_empty() {
            self.resource_locks.remove(name);
        }

        if let Some(locks) = self.transaction_locks.get_mut(&txn) {
            locks.retain(|lock| &lock.name != name);
            if locks.is_empty() {
                self.transaction_locks.remove(&txn);
            }
        }
        trace!(txn_id = txn, resource = %name, "lock released");
        self.changes.push(TableChange::Removed(txn, name.clone()));
        true
    }

    fn block(&mut self, txn: TransactionId, strategy: &dyn LockStrategy) {
        debug!(txn_id = txn, "transaction blocked");
        self.blocked.insert(txn);
        strategy.observe(&LockEvent::Block { txn });
    }

    fn unblock(&mut self, txn: TransactionId, strategy: &dyn LockStrategy) {
        if self.blocked.remove(&txn) {
            debug!(txn_id = txn, "transaction unblocked");
            strategy.observe(&LockEvent::Unblock { txn });
        }
    }

    pub fn acquire(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        lock_type: LockType,
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        if self.lock_type(txn, name).is_some() {
            return Err(violation(Error::duplicate_lock_request(txn, name)));
        }
        let lock = Lock::new(name.clone(), lock_type);
        if self.conflicts(txn, name, lock_type) {
            debug!(txn_id = txn, lock = %lock, "acquire queued");
            self.block(txn, strategy);
            self.wait_queue.push_back(LockRequest::new(txn, lock));
        } else {
            self.insert(txn, lock);
        }
        Ok(())
    }

    pub fn release(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        if !self.remove(txn, name) {
            return Err(violation(Error::no_lock_held(txn, name)));
        }
        self.process_queue(name, strategy);
        Ok(())
    }

    pub fn promote(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        new_type: LockType,
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        let held = self
            .lock_type(txn, name)
            .ok_or_else(|| violation(Error::no_lock_held(txn, name)))?;
        if held == new_type {
            return Err(violation(Error::duplicate_lock_request(txn, name)));
        }
        if !new_type.can_substitute(held) {
            return Err(violation(Error::invalid_lock(
                name,
                format!("{} is not a promotion of {}", new_type, held),
            )));
        }
        if self.conflicts(txn, name, new_type) {
            debug!(txn_id = txn, resource = %name, from = %held, to = %new_type, "promotion queued");
            self.block(txn, strategy);
            self.wait_queue
                .push_front(LockRequest::new(txn, Lock::new(name.clone(), new_type)));
        } else {
            self.set_type(txn, name, new_type);
        }
        Ok(())
    }

    pub fn acquire_and_release(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        lock_type: LockType,
        release: &[ResourceName],
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        let held = self.lock_type(txn, name);
        if held.is_some() && !release.contains(name) {
            return Err(violation(Error::duplicate_lock_request(txn, name)));
        }
        let mut released: Vec<ResourceName> = Vec::with_capacity(release.len());
        for target in release {
            if self.lock_type(txn, target).is_none() {
                return Err(violation(Error::no_lock_held(txn, target)));
            }
            if !released.contains(target) {
                released.push(target.clone());
            }
        }

        let lock = Lock::new(name.clone(), lock_type);
        if self.conflicts(txn, name, lock_type) {
            debug!(txn_id = txn, lock = %lock, released = released.len(), "acquire-and-release queued");
            self.block(txn, strategy);
            let request = LockRequest::with_released(txn, lock, released);
            // Replacing a held lock is an upgrade and gets promotion priority.
            if held.is_some() {
                self.wait_queue.push_front(request);
            } else {
                self.wait_queue.push_back(request);
            }
            return Ok(());
        }

        if held.is_some() {
            // Released and reacquired, so it moves to the end of both orders.
            self.remove(txn, name);
        }
        self.insert(txn, lock);
        for target in released.iter().filter(|target| *target != name) {
            self.remove(txn, target);
            self.process_queue(target, strategy);
        }
        if held.is_some() {
            self.process_queue(name, strategy);
        }
        Ok(())
    }

    /// Drops every queued request of `txn` and unblocks it. Returns false if
    /// nothing was queued.
    pub fn cancel(&mut self, txn: TransactionId, strategy: &dyn LockStrategy) -> bool {
        let mut cancelled = Vec::new();
        self.wait_queue.retain(|request| {
            if request.txn == txn {
                cancelled.push(request.lock.name.clone());
                false
            } else {
                true
            }
        });
        if cancelled.is_empty() {
            return false;
        }
        debug!(txn_id = txn, count = cancelled.len(), "queued requests withdrawn");
        self.unblock(txn, strategy);
        // Waiters behind the withdrawn requests may now be grantable.
        for name in &cancelled {
            self.process_queue(name, strategy);
        }
        true
    }

    fn is_grantable(&self, request: &LockRequest) -> bool {
        let name = &request.lock.name;
        let wanted = request.lock.lock_type;
        if self.conflicts(request.txn, name, wanted) {
            return false;
        }
        match self.lock_type(request.txn, name) {
            None => true,
            Some(held) => request.replaces_held_lock() || (held != wanted && wanted.can_substitute(held)),
        }
    }

    /// Grants queued requests on `name` in queue order, stopping at the
    /// first one that still conflicts.
    fn process_queue(&mut self, name: &ResourceName, strategy: &dyn LockStrategy) {
        loop {
            let Some(pos) = self
                .wait_queue
                .iter()
                .position(|request| &request.lock.name == name)
            else {
                return;
            };
            if !self.is_grantable(&self.wait_queue[pos]) {
                return;
            }
            let Some(request) = self.wait_queue.remove(pos) else {
                return;
            };
            self.grant(request, strategy);
        }
    }

    fn grant(&mut self, request: LockRequest, strategy: &dyn LockStrategy) {
        let replaces = request.replaces_held_lock();
        let LockRequest { txn, lock, released } = request;
        debug!(txn_id = txn, lock = %lock, "queued request granted");
        if self.lock_type(txn, &lock.name).is_some() && !replaces {
            self.set_type(txn, &lock.name, lock.lock_type);
        } else {
            if replaces {
                self.remove(txn, &lock.name);
            }
            self.insert(txn, lock.clone());
        }
        strategy.observe(&LockEvent::Grant { txn, lock: &lock });

        for target in released.iter().filter(|target| **target != lock.name) {
            // The owner may have released it while waiting.
            if self.remove(txn, target) {
                self.process_queue(target, strategy);
            }
        }
        self.unblock(txn, strategy);
    }
}

/// Everything guarded by the manager's mutex.
#[derive(Debug, Default)]
pub(crate) struct ManagerState {
    pub tables: LockTables,
    pub contexts: ContextArena,
}

impl ManagerState {
    /// Applies pending grants and removals to the child lock counts of the
    /// parent contexts.
    fn sync_child_counts(&mut self) {
        for change in self.tables.take_changes() {
            match change {
                TableChange::Granted(txn, name) => self.contexts.child_lock_granted(txn, &name),
                TableChange::Removed(txn, name) => self.contexts.child_lock_removed(txn, &name),
            }
        }
    }

    pub fn acquire(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        lock_type: LockType,
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        let result = self.tables.acquire(txn, name, lock_type, strategy);
        self.sync_child_counts();
        result
    }

    pub fn release(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        let result = self.tables.release(txn, name, strategy);
        self.sync_child_counts();
        result
    }

    pub fn promote(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        new_type: LockType,
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        let result = self.tables.promote(txn, name, new_type, strategy);
        self.sync_child_counts();
        result
    }

    pub fn acquire_and_release(
        &mut self,
        txn: TransactionId,
        name: &ResourceName,
        lock_type: LockType,
        release: &[ResourceName],
        strategy: &dyn LockStrategy,
    ) -> Result<()> {
        let result = self
            .tables
            .acquire_and_release(txn, name, lock_type, release, strategy);
        self.sync_child_counts();
        result
    }

    pub fn cancel(&mut self, txn: TransactionId, strategy: &dyn LockStrategy) -> bool {
        let cancelled = self.tables.cancel(txn, strategy);
        self.sync_child_counts();
        cancelled
    }
}

struct Shared {
    state: Mutex<ManagerState>,
    strategy: Arc<dyn LockStrategy>,
    config: LockConfig,
}

/// Lock manager for managing resource locks.
///
/// Cloning is cheap; clones share the same lock state. Every operation
/// runs under one mutex, so compound operations are never observed half
/// applied.
#[derive(Clone)]
pub struct LockManager {
    shared: Arc<Shared>,
}

impl LockManager {
    /// Creates a lock manager with the standard strategy.
    pub fn new() -> Self {
        Self::with_strategy(Arc::new(Standard))
    }

    /// Creates a lock manager with the given strategy.
    pub fn with_strategy(strategy: Arc<dyn LockStrategy>) -> Self {
        Self::with_config(LockConfig::default(), strategy)
    }

    /// Creates a lock manager with the given configuration and strategy.
    pub fn with_config(config: LockConfig, strategy: Arc<dyn LockStrategy>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ManagerState::default()),
                strategy,
                config,
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LockConfig {
        &self.shared.config
    }

    /// Returns the strategy.
    pub fn strategy(&self) -> &dyn LockStrategy {
        &*self.shared.strategy
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.shared.state.lock()
    }

    /// Returns true if both handles share the same lock state.
    pub fn same_manager(&self, other: &LockManager) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Returns the context of the whole database.
    pub fn database_context(&self) -> LockContext {
        self.root_context(DATABASE)
    }

    /// Returns a parentless context for `name`, e.g. a temporary table.
    pub fn orphan_context(&self, name: impl fmt::Display) -> Result<LockContext> {
        let name = name.to_string();
        if name == DATABASE {
            return Err(Error::invalid_operation(
                "cannot create an orphan context named 'database'",
            ));
        }
        Ok(self.root_context(&name))
    }

    fn root_context(&self, name: &str) -> LockContext {
        let (id, name) = self.state().contexts.root(name);
        LockContext::new(self.clone(), id, name)
    }

    /// Acquires a `lock_type` lock on `name` for `txn`, or queues the
    /// request and blocks `txn` if another transaction holds a conflicting
    /// lock.
    ///
    /// Fails with `DuplicateLockRequest` if `txn` already holds any lock on
    /// `name`.
    pub fn acquire(&self, txn: TransactionId, name: &ResourceName, lock_type: LockType) -> Result<()> {
        let strategy = self.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.state();
        state.acquire(txn, name, lock_type, strategy)?;
        strategy.observe(&LockEvent::Acquire {
            txn,
            name,
            lock_type,
        });
        Ok(())
    }

    /// Releases `txn`'s lock on `name` and grants whatever queued requests
    /// on `name` became grantable.
    pub fn release(&self, txn: TransactionId, name: &ResourceName) -> Result<()> {
        let strategy = self.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.state();
        state.release(txn, name, strategy)?;
        strategy.observe(&LockEvent::Release { txn, name });
        Ok(())
    }

    /// Promotes `txn`'s lock on `name` to `new_type`, keeping its place in
    /// acquisition order. A conflicting promotion is queued at the front.
    pub fn promote(&self, txn: TransactionId, name: &ResourceName, new_type: LockType) -> Result<()> {
        let strategy = self.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.state();
        state.promote(txn, name, new_type, strategy)?;
        strategy.observe(&LockEvent::Promote {
            txn,
            name,
            lock_type: new_type,
        });
        Ok(())
    }

    /// Acquires `lock_type` on `name` and, once granted, releases every
    /// resource in `release`.
    ///
    /// If `name` is itself in `release` the held lock is released and
    /// reacquired at `lock_type`, so it moves to the end of the acquisition
    /// order.
    /// If the acquire conflicts, the whole request waits in the queue and
    /// the releases happen together with the grant.
    pub fn acquire_and_release(
        &self,
        txn: TransactionId,
        name: &ResourceName,
        lock_type: LockType,
        release: &[ResourceName],
    ) -> Result<()> {
        let strategy = self.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.state();
        state.acquire_and_release(txn, name, lock_type, release, strategy)?;
        strategy.observe(&LockEvent::AcquireAndRelease {
            txn,
            name,
            lock_type,
            released: release,
        });
        Ok(())
    }

    /// Withdraws every request `txn` has waiting in the queue and unblocks
    /// it. Held locks are untouched. Returns true if anything was queued.
    pub fn cancel_waiting(&self, txn: TransactionId) -> bool {
        let strategy = self.strategy();
        if !strategy.enforces_locks() {
            return false;
        }
        self.state().cancel(txn, strategy)
    }

    /// Returns the type of lock `txn` holds on `name`.
    pub fn lock_type(&self, txn: TransactionId, name: &ResourceName) -> Option<LockType> {
        if !self.strategy().enforces_locks() {
            return None;
        }
        self.state().tables.lock_type(txn, name)
    }

    /// Returns the holders of `name` in acquisition order.
    pub fn locks_on(&self, name: &ResourceName) -> Vec<(TransactionId, LockType)> {
        if !self.strategy().enforces_locks() {
            return Vec::new();
        }
        self.state().tables.locks_on(name)
    }

    /// Returns the locks held by `txn` in acquisition order.
    pub fn locks_held_by(&self, txn: TransactionId) -> Vec<Lock> {
        if !self.strategy().enforces_locks() {
            return Vec::new();
        }
        self.state().tables.locks_held_by(txn).to_vec()
    }

    /// Returns true if `txn` has a request waiting in the queue.
    pub fn is_blocked(&self, txn: TransactionId) -> bool {
        self.state().tables.is_blocked(txn)
    }

    /// Returns the queued requests on `name` in the order they will be
    /// considered.
    pub fn queued_on(&self, name: &ResourceName) -> Vec<(TransactionId, LockType)> {
        self.state().tables.queued_on(name)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("strategy", &self.shared.strategy)
            .field("config", &self.shared.config)
            .finish()
    }
}
