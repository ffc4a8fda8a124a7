//! Pluggable lock manager behavior.
//!
//! The manager and context logic is written once; a [`LockStrategy`]
//! decides whether requests reach the lock tables and observes every
//! completed operation.

use crate::lock::Lock;
use crate::lock_type::LockType;
use parking_lot::Mutex;
use std::fmt;
use strata_core::{ResourceName, TransactionId};

/// An observable lock manager event.
#[derive(Clone, Copy, Debug)]
pub enum LockEvent<'a> {
    /// A caller acquired (or queued for) a lock.
    Acquire {
        txn: TransactionId,
        name: &'a ResourceName,
        lock_type: LockType,
    },
    /// A caller released a lock.
    Release {
        txn: TransactionId,
        name: &'a ResourceName,
    },
    /// A caller promoted (or queued a promotion of) a lock.
    Promote {
        txn: TransactionId,
        name: &'a ResourceName,
        lock_type: LockType,
    },
    /// A caller issued a combined acquire-and-release.
    AcquireAndRelease {
        txn: TransactionId,
        name: &'a ResourceName,
        lock_type: LockType,
        released: &'a [ResourceName],
    },
    /// A queued request was granted while another transaction released.
    Grant { txn: TransactionId, lock: &'a Lock },
    /// A transaction was blocked.
    Block { txn: TransactionId },
    /// A transaction was unblocked.
    Unblock { txn: TransactionId },
    /// Child locks of a context were disabled.
    DisableChildLocks { name: &'a ResourceName },
    /// A context declared its capacity.
    SetCapacity {
        name: &'a ResourceName,
        capacity: usize,
    },
}

impl LockEvent<'_> {
    /// Returns true for events raised inside another operation rather than
    /// directly by a caller.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            LockEvent::Grant { .. } | LockEvent::Block { .. } | LockEvent::Unblock { .. }
        )
    }
}

/// Behavior injected into a [`LockManager`](crate::LockManager).
pub trait LockStrategy: Send + Sync + fmt::Debug {
    /// Whether requests are applied to the lock tables. When false every
    /// mutating call succeeds without effect and readers see no locks.
    fn enforces_locks(&self) -> bool {
        true
    }

    /// Called after each event, with the manager's state lock held.
    fn observe(&self, event: &LockEvent<'_>) {
        let _ = event;
    }
}

/// Full enforcement, no extra observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Standard;

impl LockStrategy for Standard {}

/// Disables locking entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOp;

impl LockStrategy for NoOp {
    fn enforces_locks(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct LogState {
    entries: Vec<String>,
    recording: bool,
    suppress_internals: bool,
}

/// Full enforcement plus a textual log of events.
///
/// Recording is off until [`Logging::start`] is called. Internal events
/// (queue grants, block and unblock) are suppressed by default.
#[derive(Debug)]
pub struct Logging {
    state: Mutex<LogState>,
}

impl Logging {
    /// Creates a logging strategy that is not yet recording.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState {
                entries: Vec::new(),
                recording: false,
                suppress_internals: true,
            }),
        }
    }

    /// Starts recording.
    pub fn start(&self) {
        self.state.lock().recording = true;
    }

    /// Stops recording; recorded entries are kept.
    pub fn stop(&self) {
        self.state.lock().recording = false;
    }

    /// Discards recorded entries.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Returns true while recording.
    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    /// Controls whether internal events are recorded.
    pub fn suppress_internals(&self, suppress: bool) {
        self.state.lock().suppress_internals = suppress;
    }

    /// Returns a copy of the recorded entries.
    pub fn entries(&self) -> Vec<String> {
        self.state.lock().entries.clone()
    }

    /// Records a free-form entry if recording.
    pub fn emit(&self, entry: impl Into<String>) {
        let mut state = self.state.lock();
        if state.recording {
            state.entries.push(entry.into());
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStrategy for Logging {
    fn observe(&self, event: &LockEvent<'_>) {
        let mut state = self.state.lock();
        if !state.recording || (event.is_internal() && state.suppress_internals) {
            return;
        }
        match *event {
            LockEvent::Acquire {
                txn,
                name,
                lock_type,
            } => state.entries.push(format!("acquire {} {} {}", txn, name, lock_type)),
            LockEvent::Release { txn, name } => {
                state.entries.push(format!("release {} {}", txn, name))
            }
            LockEvent::Promote {
                txn,
                name,
                lock_type,
            } => state.entries.push(format!("promote {} {} {}", txn, name, lock_type)),
            LockEvent::AcquireAndRelease {
                txn,
                name,
                lock_type,
                released,
            } => {
                state
                    .entries
                    .push(format!("acquire/t {} {} {}", txn, name, lock_type));
                let mut released: Vec<String> = released.iter().map(|n| n.to_string()).collect();
                released.sort();
                for n in released {
                    state.entries.push(format!("release/t {} {}", txn, n));
                }
            }
            LockEvent::Grant { txn, lock } => state
                .entries
                .push(format!("grant {} {} {}", txn, lock.name, lock.lock_type)),
            LockEvent::Block { txn } => state.entries.push(format!("block {}", txn)),
            LockEvent::Unblock { txn } => state.entries.push(format!("unblock {}", txn)),
            LockEvent::DisableChildLocks { name } => {
                state.entries.push(format!("disable-children {}", name))
            }
            LockEvent::SetCapacity { name, capacity } => state
                .entries
                .push(format!("set-capacity {} {}", name, capacity)),
        }
    }
}
