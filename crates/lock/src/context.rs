//! Hierarchical lock contexts.
//!
//! A [`LockContext`] is a node in a tree that mirrors the resource
//! hierarchy (database → table → page). Locking through a context enforces
//! multigranularity rules that the flat [`LockManager`] does not know
//! about: a lock is only granted if the parent holds a sufficient intent
//! lock, and a lock cannot be released while a descendant is still locked.
//!
//! Contexts are created lazily on first access and live as long as their
//! manager. They are stored in an arena inside the manager's state, so a
//! `LockContext` value is just a handle.

use crate::lock_type::{self, LockType};
use crate::manager::{violation, LockManager, LockTables, ManagerState};
use crate::strategy::LockEvent;
use hashbrown::HashMap;
use std::fmt;
use strata_core::{Error, ResourceName, Result, TransactionId};
use tracing::debug;

pub(crate) type ContextId = usize;

#[derive(Debug)]
struct ContextNode {
    name: ResourceName,
    parent: Option<ContextId>,
    children: HashMap<String, ContextId>,
    capacity: usize,
    /// New children are created readonly.
    child_locks_disabled: bool,
    readonly: bool,
}

/// Storage for every context of one manager.
#[derive(Debug, Default)]
pub(crate) struct ContextArena {
    nodes: Vec<ContextNode>,
    roots: HashMap<String, ContextId>,
    /// Locks held on direct children, per parent resource and transaction.
    /// Tracked for parents with no context yet as well.
    child_locks: HashMap<ResourceName, HashMap<TransactionId, usize>>,
}

impl ContextArena {
    /// Returns the root context `name`, creating it if needed.
    pub fn root(&mut self, name: &str) -> (ContextId, ResourceName) {
        if let Some(&id) = self.roots.get(name) {
            return (id, self.nodes[id].name.clone());
        }
        let id = self.push(ResourceName::new(name), None, false);
        self.roots.insert(name.to_string(), id);
        (id, self.nodes[id].name.clone())
    }

    /// Returns the child `segment` of `parent`, creating it if needed.
    pub fn child(&mut self, parent: ContextId, segment: String) -> (ContextId, ResourceName) {
        if let Some(&id) = self.nodes[parent].children.get(&segment) {
            return (id, self.nodes[id].name.clone());
        }
        let node = &self.nodes[parent];
        let readonly = node.child_locks_disabled || node.readonly;
        let name = node.name.child(&segment);
        let id = self.push(name, Some(parent), readonly);
        self.nodes[parent].children.insert(segment, id);
        (id, self.nodes[id].name.clone())
    }

    fn push(&mut self, name: ResourceName, parent: Option<ContextId>, readonly: bool) -> ContextId {
        let id = self.nodes.len();
        self.nodes.push(ContextNode {
            name,
            parent,
            children: HashMap::new(),
            capacity: 0,
            child_locks_disabled: false,
            readonly,
        });
        id
    }

    fn node(&self, id: ContextId) -> &ContextNode {
        &self.nodes[id]
    }

    fn node_mut(&mut self, id: ContextId) -> &mut ContextNode {
        &mut self.nodes[id]
    }

    pub fn child_lock_granted(&mut self, txn: TransactionId, name: &ResourceName) {
        let Some(parent) = name.parent() else {
            return;
        };
        *self.child_locks.entry(parent).or_default().entry(txn).or_insert(0) += 1;
    }

    pub fn child_lock_removed(&mut self, txn: TransactionId, name: &ResourceName) {
        let Some(parent) = name.parent() else {
            return;
        };
        let Some(counts) = self.child_locks.get_mut(&parent) else {
            return;
        };
        if let Some(count) = counts.get_mut(&txn) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&txn);
            }
        }
        if counts.is_empty() {
            self.child_locks.remove(&parent);
        }
    }

    fn num_child_locks(&self, id: ContextId, txn: TransactionId) -> usize {
        self.child_locks
            .get(&self.nodes[id].name)
            .and_then(|counts| counts.get(&txn))
            .copied()
            .unwrap_or(0)
    }
}

fn describe(lock_type: Option<LockType>) -> String {
    lock_type.map_or_else(|| "no lock".to_string(), |t| t.to_string())
}

/// Checks that the parent of `name` holds a lock allowing `lock_type` on `name`.
fn check_parent_lock(
    tables: &LockTables,
    txn: TransactionId,
    name: &ResourceName,
    lock_type: LockType,
) -> Result<()> {
    let Some(parent) = name.parent() else {
        return Ok(());
    };
    let held = tables.lock_type(txn, &parent);
    let required = lock_type.parent_lock();
    if lock_type::substitutable(held, Some(required)) {
        Ok(())
    } else {
        Err(violation(Error::invalid_lock(
            name,
            format!(
                "{} requires {} on {}, transaction {} holds {}",
                lock_type,
                required,
                parent,
                txn,
                describe(held)
            ),
        )))
    }
}

/// A handle to one node of the lock hierarchy.
#[derive(Clone)]
pub struct LockContext {
    manager: LockManager,
    id: ContextId,
    name: ResourceName,
}

impl LockContext {
    pub(crate) fn new(manager: LockManager, id: ContextId, name: ResourceName) -> Self {
        Self { manager, id, name }
    }

    /// Returns the context for `name`, creating every context along the
    /// path. Paths starting with `database` hang off the database context;
    /// anything else starts at an orphan context.
    pub fn from_resource_name(manager: &LockManager, name: &ResourceName) -> LockContext {
        let mut state = manager.state();
        let (mut id, mut ctx_name) = state.contexts.root(name.root());
        for segment in name.segments().skip(1) {
            (id, ctx_name) = state.contexts.child(id, segment.to_string());
        }
        LockContext::new(manager.clone(), id, ctx_name)
    }

    /// Returns the resource this context locks.
    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Returns the manager this context belongs to.
    pub fn manager(&self) -> &LockManager {
        &self.manager
    }

    /// Returns the parent context, or `None` at a root.
    pub fn parent_context(&self) -> Option<LockContext> {
        let state = self.manager.state();
        let parent = state.contexts.node(self.id).parent?;
        let name = state.contexts.node(parent).name.clone();
        Some(LockContext::new(self.manager.clone(), parent, name))
    }

    /// Returns the child context `name`, creating it on first access.
    ///
    /// A new child is readonly if this context is readonly or has disabled
    /// child locks at the time of creation.
    pub fn child_context(&self, name: impl fmt::Display) -> LockContext {
        let (id, name) = self.manager.state().contexts.child(self.id, name.to_string());
        LockContext::new(self.manager.clone(), id, name)
    }

    fn check_writable(&self, state: &ManagerState) -> Result<()> {
        if state.contexts.node(self.id).readonly {
            return Err(violation(Error::read_only(&self.name)));
        }
        Ok(())
    }

    /// Acquires a `lock_type` lock for `txn`. The request is queued and
    /// `txn` blocked if another transaction holds a conflicting lock.
    ///
    /// Fails with `InvalidLock` if the parent's lock does not allow
    /// `lock_type`, `DuplicateLockRequest` if a lock is already held here,
    /// and `ReadOnly` if this context is readonly.
    pub fn acquire(&self, txn: TransactionId, lock_type: LockType) -> Result<()> {
        let strategy = self.manager.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.manager.state();
        self.check_writable(&state)?;
        check_parent_lock(&state.tables, txn, &self.name, lock_type)?;
        state.acquire(txn, &self.name, lock_type, strategy)?;
        strategy.observe(&LockEvent::Acquire {
            txn,
            name: &self.name,
            lock_type,
        });
        Ok(())
    }

    /// Releases `txn`'s lock here.
    ///
    /// Fails with `InvalidLock` while `txn` still holds a lock on any
    /// descendant, `NoLockHeld` if there is nothing to release, and
    /// `ReadOnly` if this context is readonly.
    pub fn release(&self, txn: TransactionId) -> Result<()> {
        let strategy = self.manager.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.manager.state();
        self.check_writable(&state)?;
        if let Some(lock) = state
            .tables
            .locks_held_by(txn)
            .iter()
            .find(|lock| lock.name.is_child_of(&self.name))
        {
            return Err(violation(Error::invalid_lock(
                &self.name,
                format!("transaction {} still holds {}", txn, lock),
            )));
        }
        state.release(txn, &self.name, strategy)?;
        strategy.observe(&LockEvent::Release {
            txn,
            name: &self.name,
        });
        Ok(())
    }

    /// Promotes `txn`'s lock here to `new_type`. A conflicting promotion is
    /// queued ahead of plain acquires.
    pub fn promote(&self, txn: TransactionId, new_type: LockType) -> Result<()> {
        let strategy = self.manager.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.manager.state();
        self.check_writable(&state)?;
        check_parent_lock(&state.tables, txn, &self.name, new_type)?;
        state.promote(txn, &self.name, new_type, strategy)?;
        strategy.observe(&LockEvent::Promote {
            txn,
            name: &self.name,
            lock_type: new_type,
        });
        Ok(())
    }

    /// Replaces every lock `txn` holds below this context with a single lock
    /// here, the least permissive one that still allows everything the
    /// replaced locks allowed. The current lock here is kept when it already
    /// covers them.
    ///
    /// Issues exactly one acquire-and-release to the manager. Fails with
    /// `NoLockHeld` if `txn` holds no lock on a child.
    pub fn escalate(&self, txn: TransactionId) -> Result<()> {
        let strategy = self.manager.strategy();
        if !strategy.enforces_locks() {
            return Ok(());
        }
        let mut state = self.manager.state();
        self.check_writable(&state)?;
        if state.contexts.num_child_locks(self.id, txn) == 0 {
            return Err(violation(Error::no_lock_held(txn, &self.name)));
        }

        let local = state.tables.lock_type(txn, &self.name);
        let mut descendants = None;
        let mut released = Vec::new();
        // Read from the lock tables, so locks on children that were never
        // materialized as contexts are covered too.
        for lock in state.tables.locks_held_by(txn) {
            if lock.name.is_child_of(&self.name) {
                descendants = lock_type::join(descendants, Some(lock.lock_type));
                released.push(lock.name.clone());
            }
        }
        let Some(desc) = descendants else {
            return Err(violation(Error::no_lock_held(txn, &self.name)));
        };
        // The local lock is kept only if it already covers the descendants.
        // An intent lock that does not is dropped with them.
        let target = match local {
            Some(local) if local.can_substitute(desc) => local,
            Some(local) if !local.is_intent() => local.join(desc),
            _ => desc,
        };
        if local.is_some() {
            released.push(self.name.clone());
        }
        check_parent_lock(&state.tables, txn, &self.name, target)?;

        debug!(
            txn_id = txn,
            resource = %self.name,
            lock_type = %target,
            released = released.len(),
            "escalating"
        );
        state.acquire_and_release(txn, &self.name, target, &released, strategy)?;
        strategy.observe(&LockEvent::AcquireAndRelease {
            txn,
            name: &self.name,
            lock_type: target,
            released: &released,
        });
        Ok(())
    }

    /// Returns the lock `txn` holds here, or else on the nearest ancestor
    /// that has one.
    pub fn global_lock_type(&self, txn: TransactionId) -> Option<LockType> {
        if !self.manager.strategy().enforces_locks() {
            return None;
        }
        let state = self.manager.state();
        let mut current = Some(self.name.clone());
        while let Some(name) = current {
            if let Some(lock_type) = state.tables.lock_type(txn, &name) {
                return Some(lock_type);
            }
            current = name.parent();
        }
        None
    }

    /// Returns the lock `txn` holds at this level.
    pub fn local_lock_type(&self, txn: TransactionId) -> Option<LockType> {
        self.manager.lock_type(txn, &self.name)
    }

    /// Returns the join of every lock `txn` holds strictly below this
    /// context, i.e. the least permissive lock here that would cover them.
    pub fn descendant_lock_type(&self, txn: TransactionId) -> Option<LockType> {
        if !self.manager.strategy().enforces_locks() {
            return None;
        }
        let state = self.manager.state();
        state
            .tables
            .locks_held_by(txn)
            .iter()
            .filter(|lock| lock.name.is_child_of(&self.name))
            .fold(None, |acc, lock| lock_type::join(acc, Some(lock.lock_type)))
    }

    /// Makes every child created from now on readonly. Existing children
    /// are not affected.
    pub fn disable_child_locks(&self) {
        let strategy = self.manager.strategy();
        if !strategy.enforces_locks() {
            return;
        }
        let mut state = self.manager.state();
        state.contexts.node_mut(self.id).child_locks_disabled = true;
        strategy.observe(&LockEvent::DisableChildLocks { name: &self.name });
    }

    /// Returns true if acquire/release/promote/escalate are rejected here.
    pub fn is_readonly(&self) -> bool {
        self.manager.state().contexts.node(self.id).readonly
    }

    /// Declares the number of children this context has, e.g. the page
    /// count of a table. Only used for saturation.
    pub fn set_capacity(&self, capacity: usize) {
        let strategy = self.manager.strategy();
        if !strategy.enforces_locks() {
            return;
        }
        let mut state = self.manager.state();
        state.contexts.node_mut(self.id).capacity = capacity;
        strategy.observe(&LockEvent::SetCapacity {
            name: &self.name,
            capacity,
        });
    }

    /// Returns the declared capacity.
    pub fn capacity(&self) -> usize {
        if !self.manager.strategy().enforces_locks() {
            return 0;
        }
        self.manager.state().contexts.node(self.id).capacity
    }

    /// Returns the number of locks `txn` holds on children of this context.
    pub fn num_child_locks(&self, txn: TransactionId) -> usize {
        self.manager.state().contexts.num_child_locks(self.id, txn)
    }

    /// Returns the fraction of children `txn` holds locks on, or 0 if no
    /// capacity was declared.
    pub fn saturation(&self, txn: TransactionId) -> f64 {
        if !self.manager.strategy().enforces_locks() {
            return 0.0;
        }
        let state = self.manager.state();
        let node = state.contexts.node(self.id);
        if node.capacity == 0 {
            return 0.0;
        }
        state.contexts.num_child_locks(self.id, txn) as f64 / node.capacity as f64
    }
}

impl PartialEq for LockContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.manager.same_manager(&other.manager)
    }
}

impl Eq for LockContext {}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockContext({})", self.name)
    }
}

impl fmt::Debug for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockContext")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Logging, NoOp};
    use std::sync::Arc;

    struct Fixture {
        lm: LockManager,
        db: LockContext,
        table: LockContext,
        page: LockContext,
    }

    fn fixture() -> Fixture {
        let lm = LockManager::new();
        let db = lm.database_context();
        let table = db.child_context("table");
        let page = table.child_context("page");
        Fixture { lm, db, table, page }
    }

    fn holds(lm: &LockManager, txn: TransactionId, ctx: &LockContext, lock_type: LockType) -> bool {
        lm.lock_type(txn, ctx.name()) == Some(lock_type)
    }

    #[test]
    fn test_simple_acquire_fail() {
        let Fixture { db, table, .. } = fixture();

        db.acquire(0, LockType::IS).unwrap();
        assert!(matches!(
            table.acquire(0, LockType::X),
            Err(Error::InvalidLock { .. })
        ));
    }

    #[test]
    fn test_acquire_without_parent_lock_fails() {
        let Fixture { table, .. } = fixture();
        assert!(matches!(
            table.acquire(0, LockType::S),
            Err(Error::InvalidLock { .. })
        ));
        assert_eq!(table.local_lock_type(0), None);
    }

    #[test]
    fn test_simple_acquire_pass() {
        let Fixture { lm, db, table, .. } = fixture();

        db.acquire(0, LockType::IS).unwrap();
        table.acquire(0, LockType::S).unwrap();
        let locks: Vec<(ResourceName, LockType)> = lm
            .locks_held_by(0)
            .into_iter()
            .map(|lock| (lock.name, lock.lock_type))
            .collect();
        assert_eq!(
            locks,
            vec![
                (db.name().clone(), LockType::IS),
                (table.name().clone(), LockType::S),
            ]
        );
    }

    #[test]
    fn test_tree_acquire_pass() {
        let Fixture { lm, db, table, page } = fixture();

        db.acquire(0, LockType::IX).unwrap();
        table.acquire(0, LockType::IS).unwrap();
        page.acquire(0, LockType::S).unwrap();

        let names: Vec<ResourceName> = lm.locks_held_by(0).into_iter().map(|l| l.name).collect();
        assert_eq!(
            names,
            vec![db.name().clone(), table.name().clone(), page.name().clone()]
        );
    }

    #[test]
    fn test_simple_release_pass() {
        let Fixture { lm, db, table, .. } = fixture();

        db.acquire(0, LockType::IS).unwrap();
        table.acquire(0, LockType::S).unwrap();
        table.release(0).unwrap();

        assert_eq!(
            lm.locks_held_by(0),
            vec![crate::Lock::new(db.name().clone(), LockType::IS)]
        );
    }

    #[test]
    fn test_simple_release_fail() {
        let Fixture { db, table, .. } = fixture();

        db.acquire(0, LockType::IS).unwrap();
        table.acquire(0, LockType::S).unwrap();
        assert!(matches!(db.release(0), Err(Error::InvalidLock { .. })));
        assert_eq!(db.local_lock_type(0), Some(LockType::IS));
    }

    #[test]
    fn test_shared_page() {
        let Fixture { lm, db, table, page } = fixture();

        for txn in [1, 2] {
            db.acquire(txn, LockType::IS).unwrap();
            table.acquire(txn, LockType::IS).unwrap();
            page.acquire(txn, LockType::S).unwrap();
        }
        for txn in [1, 2] {
            assert!(holds(&lm, txn, &table, LockType::IS));
            assert!(holds(&lm, txn, &page, LockType::S));
        }
    }

    #[test]
    fn test_s_and_is() {
        let Fixture { lm, db, table, .. } = fixture();

        db.acquire(1, LockType::S).unwrap();
        db.acquire(2, LockType::IS).unwrap();
        table.acquire(2, LockType::S).unwrap();
        db.release(1).unwrap();

        assert!(holds(&lm, 2, &db, LockType::IS));
        assert!(holds(&lm, 2, &table, LockType::S));
        assert!(!holds(&lm, 1, &db, LockType::S));
    }

    #[test]
    fn test_shared_intent_conflict_release() {
        let Fixture { lm, db, table, .. } = fixture();

        db.acquire(1, LockType::IS).unwrap();
        db.acquire(2, LockType::IX).unwrap();
        table.acquire(1, LockType::S).unwrap();
        table.acquire(2, LockType::X).unwrap();

        assert!(holds(&lm, 1, &table, LockType::S));
        assert!(!holds(&lm, 2, &table, LockType::X));
        assert!(lm.is_blocked(2));

        table.release(1).unwrap();
        assert!(holds(&lm, 2, &table, LockType::X));
        assert!(!lm.is_blocked(2));
    }

    #[test]
    fn test_simple_promote() {
        let Fixture { lm, db, .. } = fixture();

        db.acquire(1, LockType::S).unwrap();
        db.promote(1, LockType::X).unwrap();
        assert!(holds(&lm, 1, &db, LockType::X));
    }

    #[test]
    fn test_promote_checks_parent() {
        let Fixture { db, table, .. } = fixture();

        db.acquire(1, LockType::IS).unwrap();
        table.acquire(1, LockType::S).unwrap();
        assert!(matches!(
            table.promote(1, LockType::X),
            Err(Error::InvalidLock { .. })
        ));

        db.promote(1, LockType::IX).unwrap();
        table.promote(1, LockType::X).unwrap();
        assert_eq!(table.local_lock_type(1), Some(LockType::X));
    }

    #[test]
    fn test_escalate_fail() {
        let Fixture { db, .. } = fixture();

        db.acquire(1, LockType::IS).unwrap();
        assert!(matches!(db.escalate(1), Err(Error::NoLockHeld { .. })));
    }

    #[test]
    fn test_escalate_s() {
        let Fixture { lm, db, table, .. } = fixture();

        db.acquire(1, LockType::IS).unwrap();
        table.acquire(1, LockType::S).unwrap();
        db.escalate(1).unwrap();

        assert!(holds(&lm, 1, &db, LockType::S));
        assert_eq!(table.local_lock_type(1), None);
    }

    #[test]
    fn test_escalate_multiple_s() {
        let Fixture { lm, db, table, .. } = fixture();
        let table2 = db.child_context("table2");
        let table3 = db.child_context("table3");

        db.set_capacity(4);
        db.acquire(1, LockType::IS).unwrap();
        table.acquire(1, LockType::S).unwrap();
        table2.acquire(1, LockType::S).unwrap();
        table3.acquire(1, LockType::S).unwrap();

        assert!((db.saturation(1) - 0.75).abs() < 1e-6);
        db.escalate(1).unwrap();
        assert_eq!(db.saturation(1), 0.0);

        assert!(holds(&lm, 1, &db, LockType::S));
        for ctx in [&table, &table2, &table3] {
            assert_eq!(ctx.local_lock_type(1), None);
        }
        assert_eq!(lm.locks_held_by(1).len(), 1);
    }

    #[test]
    fn test_escalate_mixed_descendants_to_six() {
        let Fixture { lm, db, table, page } = fixture();
        let page2 = table.child_context("page2");

        db.acquire(1, LockType::IX).unwrap();
        table.acquire(1, LockType::IX).unwrap();
        page.acquire(1, LockType::S).unwrap();
        page2.acquire(1, LockType::IX).unwrap();

        table.escalate(1).unwrap();
        assert_eq!(table.local_lock_type(1), Some(LockType::SIX));
        assert_eq!(page.local_lock_type(1), None);
        assert_eq!(page2.local_lock_type(1), None);
        assert_eq!(lm.locks_held_by(1).len(), 2);
    }

    #[test]
    fn test_escalate_drops_intent_lock_not_covering_children() {
        let Fixture { lm, db, table, page } = fixture();

        db.acquire(1, LockType::IX).unwrap();
        table.acquire(1, LockType::IX).unwrap();
        page.acquire(1, LockType::S).unwrap();

        table.escalate(1).unwrap();
        assert_eq!(table.local_lock_type(1), Some(LockType::S));
        assert_eq!(page.local_lock_type(1), None);

        // Other readers can still share the table.
        db.acquire(2, LockType::IS).unwrap();
        table.acquire(2, LockType::S).unwrap();
        assert!(!lm.is_blocked(2));
        assert!(holds(&lm, 2, &table, LockType::S));
    }

    #[test]
    fn test_escalate_keeps_local_lock_covering_children() {
        let Fixture { lm, db, table, page } = fixture();

        db.acquire(1, LockType::IX).unwrap();
        table.acquire(1, LockType::SIX).unwrap();
        page.acquire(1, LockType::IX).unwrap();

        table.escalate(1).unwrap();
        assert_eq!(table.local_lock_type(1), Some(LockType::SIX));
        assert_eq!(page.local_lock_type(1), None);
        assert_eq!(lm.locks_held_by(1).len(), 2);
    }

    #[test]
    fn test_escalate_covers_grandchildren() {
        let Fixture { lm, db, table, page } = fixture();

        db.acquire(1, LockType::IX).unwrap();
        table.acquire(1, LockType::IX).unwrap();
        page.acquire(1, LockType::X).unwrap();

        db.escalate(1).unwrap();
        assert_eq!(db.local_lock_type(1), Some(LockType::X));
        assert_eq!(lm.locks_held_by(1).len(), 1);
        assert_eq!(table.num_child_locks(1), 0);
        assert_eq!(db.num_child_locks(1), 0);
    }

    #[test]
    fn test_escalate_covers_unmaterialized_children() {
        let Fixture { lm, db, .. } = fixture();
        let hidden = db.name().child("never-visited");

        db.acquire(1, LockType::IS).unwrap();
        // Taken through the manager, so no context exists for it.
        lm.acquire(1, &hidden, LockType::S).unwrap();
        assert_eq!(db.num_child_locks(1), 1);

        db.escalate(1).unwrap();
        assert_eq!(lm.lock_type(1, &hidden), None);
        assert_eq!(db.local_lock_type(1), Some(LockType::S));
    }

    #[test]
    fn test_context_created_after_child_locks_counts_them() {
        let Fixture { lm, db, .. } = fixture();
        let late_page = db.name().child("late").child("0");

        lm.acquire(1, &late_page, LockType::X).unwrap();
        let late = db.child_context("late");
        assert_eq!(late.num_child_locks(1), 1);
        assert_eq!(db.num_child_locks(1), 0);

        lm.release(1, &late_page).unwrap();
        assert_eq!(late.num_child_locks(1), 0);
    }

    #[test]
    fn test_blocked_escalation_keeps_locks_until_granted() {
        let Fixture { lm, db, table, .. } = fixture();

        db.acquire(1, LockType::IX).unwrap();
        table.acquire(1, LockType::X).unwrap();
        db.acquire(2, LockType::IS).unwrap();

        db.escalate(1).unwrap();
        assert!(lm.is_blocked(1));
        assert_eq!(table.local_lock_type(1), Some(LockType::X));
        assert_eq!(db.num_child_locks(1), 1);

        db.release(2).unwrap();
        assert!(!lm.is_blocked(1));
        assert_eq!(db.local_lock_type(1), Some(LockType::X));
        assert_eq!(table.local_lock_type(1), None);
        assert_eq!(db.num_child_locks(1), 0);
    }

    #[test]
    fn test_get_lock_type() {
        let Fixture { db, table, page, .. } = fixture();

        db.acquire(1, LockType::S).unwrap();
        db.acquire(2, LockType::IS).unwrap();
        db.acquire(3, LockType::IS).unwrap();
        table.acquire(2, LockType::S).unwrap();
        table.acquire(3, LockType::IS).unwrap();
        page.acquire(3, LockType::S).unwrap();

        assert_eq!(page.global_lock_type(1), Some(LockType::S));
        assert_eq!(page.global_lock_type(2), Some(LockType::S));
        assert_eq!(page.global_lock_type(3), Some(LockType::S));
        assert_eq!(page.global_lock_type(4), None);
        assert_eq!(page.local_lock_type(1), None);
        assert_eq!(page.local_lock_type(2), None);
        assert_eq!(page.local_lock_type(3), Some(LockType::S));
    }

    #[test]
    fn test_readonly() {
        let Fixture { db, table, .. } = fixture();

        db.disable_child_locks();
        let table2 = db.child_context("table2");
        db.acquire(1, LockType::IX).unwrap();

        assert!(table2.is_readonly());
        assert!(matches!(table2.acquire(1, LockType::IX), Err(Error::ReadOnly { .. })));
        assert!(matches!(table2.release(1), Err(Error::ReadOnly { .. })));
        assert!(matches!(table2.promote(1, LockType::IX), Err(Error::ReadOnly { .. })));
        assert!(matches!(table2.escalate(1), Err(Error::ReadOnly { .. })));

        // Created before the flag was set.
        assert!(!table.is_readonly());
        table.acquire(1, LockType::X).unwrap();

        // Readonly propagates to grandchildren.
        assert!(table2.child_context("page").is_readonly());
    }

    #[test]
    fn test_saturation() {
        let Fixture { db, .. } = fixture();
        let table = db.child_context("table2");

        db.set_capacity(10);
        db.acquire(1, LockType::IX).unwrap();
        table.acquire(1, LockType::IS).unwrap();
        assert!((db.saturation(1) - 0.1).abs() < 1e-6);
        table.promote(1, LockType::IX).unwrap();
        assert!((db.saturation(1) - 0.1).abs() < 1e-6);
        table.release(1).unwrap();
        assert_eq!(db.saturation(1), 0.0);
        table.acquire(1, LockType::IS).unwrap();
        db.escalate(1).unwrap();
        assert_eq!(db.saturation(1), 0.0);
        assert_eq!(db.local_lock_type(1), Some(LockType::IX));
    }

    #[test]
    fn test_saturation_without_capacity() {
        let Fixture { db, table, .. } = fixture();

        db.acquire(0, LockType::IS).unwrap();
        table.acquire(0, LockType::S).unwrap();
        assert_eq!(db.capacity(), 0);
        assert_eq!(db.saturation(0), 0.0);
        assert_eq!(db.num_child_locks(0), 1);
    }

    #[test]
    fn test_promote_then_release_returns_saturation_to_zero() {
        let Fixture { db, table, .. } = fixture();

        db.set_capacity(5);
        db.acquire(0, LockType::IX).unwrap();
        table.acquire(0, LockType::S).unwrap();
        assert!((db.saturation(0) - 0.2).abs() < 1e-6);
        table.promote(0, LockType::X).unwrap();
        table.release(0).unwrap();
        assert_eq!(db.saturation(0), 0.0);
    }

    #[test]
    fn test_child_context_is_memoized() {
        let Fixture { lm, db, table, .. } = fixture();

        assert_eq!(db.child_context("table"), table);
        assert_eq!(table.parent_context(), Some(db.clone()));
        assert_eq!(lm.database_context(), db);
        assert!(db.parent_context().is_none());

        let by_name = LockContext::from_resource_name(&lm, &db.name().child("table").child("page"));
        assert_eq!(by_name, table.child_context("page"));

        let temp = LockContext::from_resource_name(&lm, &ResourceName::new("temp-t1").child(3));
        assert_eq!(temp.parent_context(), Some(lm.orphan_context("temp-t1").unwrap()));
    }

    #[test]
    fn test_descendant_lock_type() {
        let Fixture { db, table, page, .. } = fixture();

        assert_eq!(db.descendant_lock_type(1), None);
        db.acquire(1, LockType::IX).unwrap();
        table.acquire(1, LockType::IS).unwrap();
        page.acquire(1, LockType::S).unwrap();

        assert_eq!(db.descendant_lock_type(1), Some(LockType::S));
        assert_eq!(table.descendant_lock_type(1), Some(LockType::S));
        assert_eq!(page.descendant_lock_type(1), None);
    }

    #[test]
    fn test_logging_context_events() {
        let log = Arc::new(Logging::new());
        let lm = LockManager::with_strategy(log.clone());
        let db = lm.database_context();
        let table = db.child_context("table1");
        let page = table.child_context(4);

        log.start();
        table.set_capacity(8);
        table.disable_child_locks();
        db.acquire(0, LockType::IS).unwrap();
        table.acquire(0, LockType::IS).unwrap();
        page.acquire(0, LockType::S).unwrap();
        table.escalate(0).unwrap();

        assert_eq!(
            log.entries(),
            vec![
                "set-capacity database/table1 8",
                "disable-children database/table1",
                "acquire 0 database IS",
                "acquire 0 database/table1 IS",
                "acquire 0 database/table1/4 S",
                "acquire/t 0 database/table1 S",
                "release/t 0 database/table1",
                "release/t 0 database/table1/4",
            ]
        );
    }

    #[test]
    fn test_noop_contexts() {
        let lm = LockManager::with_strategy(Arc::new(NoOp));
        let db = lm.database_context();
        let table = db.child_context("table");

        table.acquire(0, LockType::X).unwrap();
        table.release(0).unwrap();
        db.escalate(0).unwrap();
        db.set_capacity(10);
        db.disable_child_locks();

        assert_eq!(db.capacity(), 0);
        assert_eq!(db.saturation(0), 0.0);
        assert_eq!(table.global_lock_type(0), None);
        assert!(!db.child_context("later").is_readonly());
    }
}
