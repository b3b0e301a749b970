//! Replaceable slot holding the active network entry point

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Fetch, FetchFuture, FetchOptions, Resource};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of an installer
///
/// Ownership is checked by token rather than by inspecting the handler, so a
/// host that reinstalls some other wrapper is detected even if it looks alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    /// Allocate a fresh, process-unique token
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

struct Slot {
    handler: Arc<dyn Fetch>,
    owner: Option<OwnerToken>,
}

/// Shared, replaceable network entry point
///
/// Application code calls [`EntryPoint::fetch`]; whoever controls the slot
/// decides which handler serves the call.
pub struct EntryPoint {
    slot: RwLock<Slot>,
}

impl EntryPoint {
    /// Create a slot with an unowned handler
    pub fn new(handler: impl Fetch) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Create a slot from a shared handler
    #[must_use]
    pub fn from_arc(handler: Arc<dyn Fetch>) -> Self {
        Self {
            slot: RwLock::new(Slot {
                handler,
                owner: None,
            }),
        }
    }

    /// Handler currently installed
    #[must_use]
    pub fn current(&self) -> Arc<dyn Fetch> {
        Arc::clone(&self.slot.read().handler)
    }

    /// Token of whoever installed the current handler, if anyone claimed it
    #[must_use]
    pub fn owner(&self) -> Option<OwnerToken> {
        self.slot.read().owner
    }

    /// Whether the current handler was installed under `token`
    #[must_use]
    pub fn is_owned_by(&self, token: OwnerToken) -> bool {
        self.owner() == Some(token)
    }

    /// Overwrite the slot without claiming it
    ///
    /// This is what an unrelated host component does when it installs its own
    /// wrapper. Returns the displaced handler.
    pub fn replace(&self, handler: Arc<dyn Fetch>) -> Arc<dyn Fetch> {
        let mut slot = self.slot.write();
        slot.owner = None;
        std::mem::replace(&mut slot.handler, handler)
    }

    /// Install `handler` under `token`
    ///
    /// Returns false without touching the slot when `token` already owns it.
    pub fn install(&self, handler: Arc<dyn Fetch>, token: OwnerToken) -> bool {
        let mut slot = self.slot.write();
        if slot.owner == Some(token) {
            return false;
        }
        slot.handler = handler;
        slot.owner = Some(token);
        true
    }

    /// Install `handler` under `token` even if the token already owns the slot
    pub fn force_install(&self, handler: Arc<dyn Fetch>, token: OwnerToken) {
        let mut slot = self.slot.write();
        slot.handler = handler;
        slot.owner = Some(token);
    }

    /// Put `handler` back if `token` still owns the slot
    ///
    /// Returns false when someone else has taken the slot in the meantime.
    pub fn restore(&self, handler: Arc<dyn Fetch>, token: OwnerToken) -> bool {
        let mut slot = self.slot.write();
        if slot.owner != Some(token) {
            return false;
        }
        slot.handler = handler;
        slot.owner = None;
        true
    }

    /// Dispatch a call to the current handler
    pub fn fetch(&self, resource: impl Into<Resource>, options: FetchOptions) -> FetchFuture {
        let handler = self.current();
        handler.fetch(resource.into(), options)
    }
}

impl std::fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoint")
            .field("owner", &self.owner())
            .finish_non_exhaustive()
    }
}
