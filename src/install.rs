//! Process-wide installation state and the per-thread stack of active scopes.
//!
//! ## Installation
//!
//! [`Installation`] has exactly two states, installed and uninstalled. While installed it owns one [`ScopeSlot`] per
//! scope under exploration (the generator plus the scope's policy). Engine lifecycle hooks call
//! [`Installation::install`] / [`Installation::uninstall`] explicitly; a pick made while uninstalled installs
//! implicitly.
//!
//! ## Active scopes
//!
//! Picks do not carry a scope handle. The driver pushes its scope onto a thread-local stack for the duration of a
//! repetition and the pick surface resolves against the top entry. One scope is only ever driven from one thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use lazer_core::{Lazer, LazerError, ScopeConfig, ScopePolicy};
use parking_lot::Mutex;

/// Key naming one scope (usually the engine's unique id of the test node).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey(Arc<str>);

impl ScopeKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        ScopeKey(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exploration state of one scope.
#[derive(Debug)]
pub(crate) struct ScopeSlot {
    /// Created on the scope's first pick.
    pub(crate) lazer: Option<Lazer>,
    pub(crate) policy: ScopePolicy,
    /// A repetition of this scope is running right now.
    pub(crate) executing: bool,
    /// Owned by a driver that has not concluded yet; survives [`Installation::reset`].
    pub(crate) exploring: bool,
    /// First protocol violation of the running repetition, kept even if the body swallowed the error.
    pub(crate) violation: Option<LazerError>,
    pub(crate) owner: ThreadId,
    /// Recreated by a pick after the installation discarded the original slot.
    pub(crate) orphaned: bool,
    /// Registration token of the driver owning the slot.
    token: u64,
}

impl ScopeSlot {
    fn new(config: ScopeConfig, token: u64) -> Self {
        Self {
            lazer: None,
            policy: ScopePolicy::new(config),
            executing: false,
            exploring: true,
            violation: None,
            owner: thread::current().id(),
            orphaned: false,
            token,
        }
    }
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct InstallState {
    installed: bool,
    epoch: u64,
    scopes: HashMap<ScopeKey, ScopeSlot>,
}

impl InstallState {
    fn ensure_installed(&mut self) {
        if !self.installed {
            tracing::debug!(epoch = self.epoch, "implicit install");
            self.installed = true;
        }
    }
}

/// Handle to one installation of the picking mechanism.
///
/// Clones share state. [`Installation::global`] is the process-wide instance; isolated instances are useful for
/// embedding engines and for tests that must not disturb each other.
#[derive(Debug, Clone, Default)]
pub struct Installation {
    state: Arc<Mutex<InstallState>>,
}

static GLOBAL: OnceLock<Installation> = OnceLock::new();

impl Installation {
    /// Create an isolated, uninstalled instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide installation.
    pub fn global() -> Installation {
        GLOBAL.get_or_init(Installation::new).clone()
    }

    /// Install. Returns `false` if already installed.
    pub fn install(&self) -> bool {
        let mut state = self.state.lock();
        if state.installed {
            return false;
        }
        state.installed = true;
        tracing::debug!(epoch = state.epoch, "installed");
        true
    }

    /// Uninstall, discarding every scope's generator. Returns the number of scopes discarded.
    pub fn uninstall(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.scopes.len();
        state.scopes.clear();
        state.installed = false;
        state.epoch += 1;
        if discarded > 0 {
            tracing::warn!(discarded, epoch = state.epoch, "uninstalled with scopes in flight");
        }
        discarded
    }

    /// Discard every generator no live driver is exploring, and stay installed.
    ///
    /// Scopes between registration and conclusion keep their generator, so this is safe to call from an engine's
    /// nested initialization phase (`prepare`, `before`) while a scope is executing.
    pub fn reset(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.scopes.len();
        state.scopes.retain(|_, slot| slot.exploring || slot.executing);
        state.installed = true;
        state.epoch += 1;
        let discarded = before - state.scopes.len();
        tracing::debug!(discarded, kept = state.scopes.len(), epoch = state.epoch, "reset");
        discarded
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().installed
    }

    /// Incremented by every uninstall and reset.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Keys of every scope currently owning a slot, sorted.
    pub fn active_scopes(&self) -> Vec<ScopeKey> {
        let mut keys: Vec<ScopeKey> = self.state.lock().scopes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether both handles refer to the same installation.
    pub fn same_as(&self, other: &Installation) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Claim `key` for a new driver, returning the registration token.
    pub(crate) fn register(&self, key: &ScopeKey, config: ScopeConfig) -> Result<u64, LazerError> {
        let mut state = self.state.lock();
        state.ensure_installed();
        if state.scopes.contains_key(key) {
            return Err(LazerError::ScopeAlreadyActive {
                scope: key.to_string(),
            });
        }
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        state.scopes.insert(key.clone(), ScopeSlot::new(config, token));
        Ok(token)
    }

    /// Run `f` on the slot for `scope`, recreating it if it was discarded.
    pub(crate) fn with_slot<R>(&self, scope: &ActiveScope, f: impl FnOnce(&mut ScopeSlot) -> R) -> R {
        let mut state = self.state.lock();
        state.ensure_installed();
        let key = &scope.key;
        let slot = state.scopes.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(scope = %key, "scope slot recreated after teardown");
            let mut slot = ScopeSlot::new(scope.config, scope.token);
            slot.orphaned = true;
            slot.exploring = false;
            slot
        });
        if slot.owner != thread::current().id() {
            tracing::warn!(scope = %key, "scope touched from a thread other than the one driving it");
        }
        f(slot)
    }

    /// Run `f` on the slot for `key` if it still exists and still belongs to `token`.
    pub(crate) fn with_existing_slot<R>(
        &self,
        key: &ScopeKey,
        token: u64,
        f: impl FnOnce(&mut ScopeSlot) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock();
        state.scopes.get_mut(key).filter(|slot| slot.token == token).map(f)
    }

    /// Drop the slot for `key` if it belongs to `token`.
    pub(crate) fn remove(&self, key: &ScopeKey, token: u64) -> bool {
        let mut state = self.state.lock();
        if state.scopes.get(key).is_some_and(|slot| slot.token == token) {
            state.scopes.remove(key);
            return true;
        }
        false
    }
}

// ============================================================================
// Active scope stack
// ============================================================================

/// The scope a pick on this thread resolves against.
#[derive(Debug, Clone)]
pub(crate) struct ActiveScope {
    pub(crate) installation: Installation,
    pub(crate) key: ScopeKey,
    pub(crate) config: ScopeConfig,
    pub(crate) token: u64,
}

thread_local! {
    static ACTIVE: RefCell<Vec<ActiveScope>> = const { RefCell::new(Vec::new()) };
}

/// Top of this thread's active scope stack.
pub(crate) fn current_scope() -> Result<ActiveScope, LazerError> {
    ACTIVE.with(|stack| stack.borrow().last().cloned().ok_or(LazerError::NoActiveScope))
}

/// Whether any scope is active on this thread.
pub fn in_scope() -> bool {
    ACTIVE.with(|stack| !stack.borrow().is_empty())
}

/// Keeps a scope on this thread's stack until dropped.
#[derive(Debug)]
pub(crate) struct Activation {
    key: ScopeKey,
    // Pins the guard to the thread whose stack it pushed onto.
    _not_send: PhantomData<*const ()>,
}

impl Activation {
    pub(crate) fn push(scope: ActiveScope) -> Self {
        let key = scope.key.clone();
        ACTIVE.with(|stack| stack.borrow_mut().push(scope));
        Self {
            key,
            _not_send: PhantomData,
        }
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|scope| scope.key == self.key) {
                stack.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let installation = Installation::new();
        assert!(!installation.is_installed());
        assert!(installation.install());
        assert!(!installation.install());
        assert!(installation.is_installed());
    }

    #[test]
    fn register_installs_implicitly_and_rejects_duplicates() {
        let installation = Installation::new();
        let key = ScopeKey::new("suite/test_a");
        installation.register(&key, ScopeConfig::new()).unwrap();
        assert!(installation.is_installed());
        assert!(matches!(
            installation.register(&key, ScopeConfig::new()),
            Err(LazerError::ScopeAlreadyActive { .. })
        ));
    }

    #[test]
    fn uninstall_discards_every_slot() {
        let installation = Installation::new();
        installation.register(&ScopeKey::new("a"), ScopeConfig::new()).unwrap();
        installation.register(&ScopeKey::new("b"), ScopeConfig::new()).unwrap();
        assert_eq!(installation.uninstall(), 2);
        assert!(installation.active_scopes().is_empty());
        assert!(!installation.is_installed());
        assert_eq!(installation.epoch(), 1);
    }

    #[test]
    fn reset_keeps_scopes_of_live_drivers() {
        let installation = Installation::new();
        let running = ScopeKey::new("running");
        let between = ScopeKey::new("between");
        let token = installation.register(&running, ScopeConfig::new()).unwrap();
        installation.register(&between, ScopeConfig::new()).unwrap();
        installation.with_existing_slot(&running, token, |slot| slot.executing = true);

        // A pick after teardown recreates an orphaned slot nobody drives.
        let orphan = ActiveScope {
            installation: installation.clone(),
            key: ScopeKey::new("orphan"),
            config: ScopeConfig::new(),
            token: 0,
        };
        installation.with_slot(&orphan, |slot| assert!(slot.orphaned));

        assert_eq!(installation.reset(), 1);
        assert_eq!(installation.active_scopes(), vec![between, running]);
        assert!(installation.is_installed());
        assert_eq!(installation.epoch(), 1);
    }

    #[test]
    fn activation_stack_unwinds() {
        let installation = Installation::new();
        assert!(matches!(current_scope(), Err(LazerError::NoActiveScope)));
        {
            let _outer = Activation::push(ActiveScope {
                installation: installation.clone(),
                key: ScopeKey::new("outer"),
                config: ScopeConfig::new(),
                token: 0,
            });
            {
                let _inner = Activation::push(ActiveScope {
                    installation: installation.clone(),
                    key: ScopeKey::new("inner"),
                    config: ScopeConfig::new(),
                    token: 0,
                });
                assert_eq!(current_scope().unwrap().key.as_str(), "inner");
            }
            assert_eq!(current_scope().unwrap().key.as_str(), "outer");
            assert!(in_scope());
        }
        assert!(!in_scope());
    }

    #[test]
    fn remove_respects_ownership() {
        let installation = Installation::new();
        let key = ScopeKey::new("owned");
        let token = installation.register(&key, ScopeConfig::new()).unwrap();
        assert!(!installation.remove(&key, token + 1));
        assert!(installation.with_existing_slot(&key, token + 1, |_| ()).is_none());
        assert!(installation.remove(&key, token));
        assert!(installation.active_scopes().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let installation = Installation::new();
        let clone = installation.clone();
        clone.install();
        assert!(installation.is_installed());
        assert!(installation.same_as(&clone));
        assert!(!installation.same_as(&Installation::new()));
    }
}
