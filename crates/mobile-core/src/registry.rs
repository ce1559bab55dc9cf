//! Call registry
//!
//! Tracks every live call by engine handle plus an optional "current call"
//! that user-facing operations act on. The registry is owned by the
//! coordination task, so it needs no locking: every mutation goes through
//! `&mut self`.
//!
//! The current call, when set, is always a member. [`CallRegistry::remove`]
//! clears it in the same step when the removed call was current.

use std::collections::HashMap;

use crate::call::Call;
use crate::engine::CallHandle;
use crate::error::{MobileError, MobileResult};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_added: usize,
    pub total_removed: usize,
}

#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: HashMap<CallHandle, Call>,
    current: Option<CallHandle>,
    stats: RegistryStats,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a call; handles are unique
    pub fn put(&mut self, call: Call) -> MobileResult<()> {
        let handle = call.handle;
        if self.calls.contains_key(&handle) {
            return Err(MobileError::CallAlreadyExists { handle });
        }
        self.calls.insert(handle, call);
        self.stats.total_added += 1;
        tracing::debug!(%handle, "Registered call");
        Ok(())
    }

    /// Remove a call, clearing the current pointer if it referred to it
    pub fn remove(&mut self, handle: CallHandle) -> Option<Call> {
        let call = self.calls.remove(&handle)?;
        if self.current == Some(handle) {
            self.current = None;
        }
        self.stats.total_removed += 1;
        tracing::debug!(%handle, remaining = self.calls.len(), "Removed call");
        Some(call)
    }

    pub fn find(&self, handle: CallHandle) -> Option<&Call> {
        self.calls.get(&handle)
    }

    pub fn find_mut(&mut self, handle: CallHandle) -> Option<&mut Call> {
        self.calls.get_mut(&handle)
    }

    pub fn contains(&self, handle: CallHandle) -> bool {
        self.calls.contains_key(&handle)
    }

    /// Make a member the current call
    pub fn set_current(&mut self, handle: CallHandle) -> MobileResult<()> {
        if !self.calls.contains_key(&handle) {
            return Err(MobileError::CallNotFound { handle });
        }
        self.current = Some(handle);
        Ok(())
    }

    pub fn current(&self) -> Option<&Call> {
        self.current.and_then(|h| self.calls.get(&h))
    }

    pub fn current_handle(&self) -> Option<CallHandle> {
        self.current
    }

    /// Current call, if it can still be acted on
    pub fn current_live(&self) -> Option<&Call> {
        self.current().filter(|c| c.is_live())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Call> {
        self.calls.values()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}
