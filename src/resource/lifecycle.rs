//! Create/destroy state machine shared by every graph member.

use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Lifecycle state of a resource.
///
/// `Uncreated -> Creating -> Created` on create and
/// `Created -> Destroying -> Uncreated` on destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Uncreated,
    Creating,
    Created,
    Destroying,
}

/// Guard around a [`LifecycleState`].
///
/// `create_with` and `destroy_with` are no-ops unless the resource is in the
/// opposite resting state, so re-entrant calls made from inside a hook return
/// immediately instead of running the hook twice.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: Cell<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn is_created(&self) -> bool {
        self.state.get() == LifecycleState::Created
    }

    /// Run `hook` to move from `Uncreated` to `Created`.
    ///
    /// Returns `Ok(false)` without running the hook when already created or
    /// mid-transition. A failing hook leaves the state `Uncreated`.
    pub fn create_with<E>(&self, hook: impl FnOnce() -> Result<(), E>) -> Result<bool, E> {
        if self.state.get() != LifecycleState::Uncreated {
            return Ok(false);
        }

        self.state.set(LifecycleState::Creating);
        match hook() {
            Ok(()) => {
                self.state.set(LifecycleState::Created);
                Ok(true)
            }
            Err(e) => {
                self.state.set(LifecycleState::Uncreated);
                Err(e)
            }
        }
    }

    /// Run `hook` to move from `Created` back to `Uncreated`.
    ///
    /// Returns `false` without running the hook unless currently created.
    pub fn destroy_with(&self, hook: impl FnOnce()) -> bool {
        if self.state.get() != LifecycleState::Created {
            return false;
        }

        self.state.set(LifecycleState::Destroying);
        hook();
        self.state.set(LifecycleState::Uncreated);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_runs_hook_once() {
        let lifecycle = Lifecycle::new();
        let calls = Cell::new(0);

        let hook = || {
            calls.set(calls.get() + 1);
            Ok::<(), ()>(())
        };
        assert_eq!(lifecycle.create_with(hook), Ok(true));
        assert_eq!(lifecycle.create_with(hook), Ok(false));
        assert_eq!(calls.get(), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Created);
    }

    #[test]
    fn test_destroy_runs_hook_once() {
        let lifecycle = Lifecycle::new();
        let calls = Cell::new(0);

        assert!(!lifecycle.destroy_with(|| calls.set(calls.get() + 1)));
        lifecycle.create_with(|| Ok::<(), ()>(())).unwrap();
        assert!(lifecycle.destroy_with(|| calls.set(calls.get() + 1)));
        assert!(!lifecycle.destroy_with(|| calls.set(calls.get() + 1)));
        assert_eq!(calls.get(), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Uncreated);
    }

    #[test]
    fn test_failed_create_returns_to_uncreated() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.create_with(|| Err("boom")), Err("boom"));
        assert_eq!(lifecycle.state(), LifecycleState::Uncreated);
        assert_eq!(lifecycle.create_with(|| Ok::<(), &str>(())), Ok(true));
    }

    #[test]
    fn test_reentrant_create_is_noop() {
        let lifecycle = Lifecycle::new();
        let inner = Cell::new(None);

        lifecycle
            .create_with(|| {
                assert_eq!(lifecycle.state(), LifecycleState::Creating);
                inner.set(Some(lifecycle.create_with(|| Ok::<(), ()>(()))));
                Ok::<(), ()>(())
            })
            .unwrap();

        assert_eq!(inner.get(), Some(Ok(false)));
    }

    #[test]
    fn test_reentrant_destroy_is_noop() {
        let lifecycle = Lifecycle::new();
        lifecycle.create_with(|| Ok::<(), ()>(())).unwrap();

        let inner = Cell::new(true);
        lifecycle.destroy_with(|| {
            assert_eq!(lifecycle.state(), LifecycleState::Destroying);
            inner.set(lifecycle.destroy_with(|| {}));
        });
        assert!(!inner.get());
    }
}
