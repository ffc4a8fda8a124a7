//! Lock acquisition policy.

use crate::context::LockContext;
use crate::lock_type::{self, LockType};
use crate::manager::LockManager;
use strata_core::{Result, TransactionId};
use tracing::debug;

/// Entry points the storage layer uses instead of calling contexts
/// directly.
pub struct LockUtil;

impl LockUtil {
    /// Ensures `txn` can perform `desired` access (S to read, X to write)
    /// on `ctx`, taking the fewest locks needed.
    ///
    /// Intent locks are acquired or upgraded on every ancestor, root first.
    /// At `ctx` itself the descendant locks are escalated if they already
    /// amount to `desired`, otherwise the local lock is promoted or a new
    /// one acquired. If a step leaves `txn` blocked the remaining steps are
    /// skipped; the caller retries once `txn` is unblocked.
    ///
    /// Does nothing when `txn` is `None` or `desired` is an intent type.
    pub fn request_locks(txn: Option<TransactionId>, ctx: &LockContext, desired: LockType) -> Result<()> {
        let Some(txn) = txn else {
            return Ok(());
        };
        if desired.is_intent() {
            return Ok(());
        }
        if lock_type::substitutable(ctx.global_lock_type(txn), Some(desired)) {
            return Ok(());
        }
        let manager = ctx.manager();

        let mut ancestors = Vec::new();
        let mut current = ctx.parent_context();
        while let Some(parent) = current {
            current = parent.parent_context();
            ancestors.push(parent);
        }

        let intent = desired.parent_lock();
        for ancestor in ancestors.iter().rev() {
            match ancestor.local_lock_type(txn) {
                Some(held) if held.can_substitute(intent) => continue,
                // S needing IX becomes SIX.
                Some(held) => ancestor.promote(txn, held.join(intent))?,
                None => ancestor.acquire(txn, intent)?,
            }
            if manager.is_blocked(txn) {
                debug!(txn_id = txn, resource = %ancestor.name(), "lock request blocked");
                return Ok(());
            }
        }

        if ctx.num_child_locks(txn) > 0 && ctx.descendant_lock_type(txn) == Some(desired) {
            ctx.escalate(txn)
        } else if let Some(held) = ctx.local_lock_type(txn) {
            ctx.promote(txn, held.join(desired))
        } else {
            ctx.acquire(txn, desired)
        }
    }

    /// Escalates `ctx` if `txn` holds locks on enough of its children, as
    /// set by the manager's [`LockConfig`](crate::LockConfig). Returns true
    /// if an escalation was issued.
    pub fn escalate_if_saturated(txn: TransactionId, ctx: &LockContext) -> Result<bool> {
        if ctx.is_readonly() || ctx.num_child_locks(txn) == 0 {
            return Ok(false);
        }
        let capacity = ctx.capacity();
        let saturation = ctx.saturation(txn);
        if !ctx.manager().config().should_escalate(capacity, saturation) {
            return Ok(false);
        }
        debug!(txn_id = txn, resource = %ctx.name(), saturation, "auto-escalating");
        ctx.escalate(txn)?;
        Ok(true)
    }

    /// Releases every lock `txn` holds and withdraws its queued requests.
    ///
    /// Locks are released deepest first, most recently acquired first among
    /// equals, so no context is released while a descendant is locked.
    pub fn release_all(txn: TransactionId, manager: &LockManager) -> Result<()> {
        manager.cancel_waiting(txn);

        let mut locks: Vec<_> = manager.locks_held_by(txn).into_iter().enumerate().collect();
        locks.sort_by(|(a_pos, a), (b_pos, b)| {
            b.name
                .depth()
                .cmp(&a.name.depth())
                .then_with(|| b_pos.cmp(a_pos))
        });

        debug!(txn_id = txn, count = locks.len(), "releasing all locks");
        for (_, lock) in locks {
            let ctx = LockContext::from_resource_name(manager, &lock.name);
            if ctx.is_readonly() {
                // Taken through the manager directly; no context owns it.
                manager.release(txn, &lock.name)?;
            } else {
                ctx.release(txn)?;
            }
        }
        Ok(())
    }
}
