//! Lazy component registry for deferred construction of heavy subsystems.
//!
//! Factories are registered while the worker bootstraps; instances are only
//! built when a request first resolves them. Each key has an explicit state
//! machine instead of a "loaded or not" flag:
//!
//! ```text
//! Unbuilt ──resolve──▶ Building ──ok──▶ Ready
//!                        ▲   │
//!                        │   └──err──▶ Failed
//!                        └────resolve────┘
//! ```
//!
//! A `Failed` entry is retried by the next `resolve`; entries never return
//! to `Unbuilt`.

use std::any::{type_name, Any};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, InitCause, Result};

/// A built component, shared by every caller.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Boxed error returned by component factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Component factory function type for lazy instantiation.
type Factory = Box<dyn Fn() -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// Identifier of a deferred subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ComponentKey(Cow<'static, str>);

impl ComponentKey {
    /// Create a key from a static name.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for ComponentKey {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for ComponentKey {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl Borrow<str> for ComponentKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observable state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Unbuilt,
    Building,
    Ready,
    Failed,
}

enum Phase {
    Unbuilt,
    Building,
    Ready(Instance),
    Failed(InitCause),
}

impl Phase {
    fn state(&self) -> ComponentState {
        match self {
            Phase::Unbuilt => ComponentState::Unbuilt,
            Phase::Building => ComponentState::Building,
            Phase::Ready(_) => ComponentState::Ready,
            Phase::Failed(_) => ComponentState::Failed,
        }
    }
}

struct Slot {
    phase: Phase,
    /// Number of builds started; lets waiters recognise the outcome of the
    /// build they waited on.
    attempts: u64,
}

struct RegistryEntry {
    key: ComponentKey,
    factory: Factory,
    slot: Mutex<Slot>,
    built: Condvar,
}

/// Counters describing registry activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Registered factories
    pub registered: usize,
    /// Entries currently `Ready`
    pub ready: usize,
    /// Factory invocations
    pub builds: u64,
    /// Factory invocations that failed
    pub failures: u64,
    /// Resolves answered from the cache
    pub hits: u64,
}

/// Registry of lazily built, per-process singleton components.
///
/// # Example
///
/// ```rust
/// use leanserve::startup::LazyComponentRegistry;
///
/// let registry = LazyComponentRegistry::new();
/// registry
///     .register("greeting", || Ok::<_, std::io::Error>(String::from("hello")))
///     .unwrap();
///
/// // Nothing built yet
/// assert_eq!(registry.instantiated_count(), 0);
///
/// let greeting = registry.resolve_as::<String>("greeting").unwrap();
/// assert_eq!(greeting.as_str(), "hello");
/// assert_eq!(registry.instantiated_count(), 1);
/// ```
#[derive(Default)]
pub struct LazyComponentRegistry {
    entries: RwLock<HashMap<ComponentKey, Arc<RegistryEntry>>>,
    sealed: AtomicBool,
    builds: AtomicU64,
    failures: AtomicU64,
    hits: AtomicU64,
}

impl LazyComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `key`.
    ///
    /// Must be called before the first `resolve`. Registering a key twice,
    /// or registering after resolution began, is reported immediately.
    pub fn register<T, E, F>(&self, key: impl Into<ComponentKey>, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        E: Into<BoxError> + 'static,
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        let key = key.into();

        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::RegistrySealed(key));
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(Error::DuplicateComponent(key));
        }

        let factory: Factory = Box::new(move || {
            factory()
                .map(|instance| Arc::new(instance) as Instance)
                .map_err(Into::into)
        });

        debug!(component = %key, "Registered lazy component");
        entries.insert(
            key.clone(),
            Arc::new(RegistryEntry {
                key,
                factory,
                slot: Mutex::new(Slot {
                    phase: Phase::Unbuilt,
                    attempts: 0,
                }),
                built: Condvar::new(),
            }),
        );
        Ok(())
    }

    /// Resolve a component, building it on first access.
    ///
    /// Concurrent callers for a key that is being built block until that
    /// build finishes and share its outcome.
    pub fn resolve(&self, key: impl Into<ComponentKey>) -> Result<Instance> {
        let key = key.into();
        self.sealed.store(true, Ordering::Release);

        let entry = self
            .entries
            .read()
            .get(&key)
            .cloned()
            .ok_or(Error::UnknownComponent(key))?;

        let mut slot = entry.slot.lock();
        let mut waited_on = None;
        loop {
            if let Phase::Ready(instance) = &slot.phase {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(instance));
            }
            if matches!(slot.phase, Phase::Building) {
                waited_on = Some(slot.attempts);
                entry.built.wait(&mut slot);
                continue;
            }
            // The build this caller waited on failed: share its outcome
            // instead of starting another one.
            if let Phase::Failed(cause) = &slot.phase {
                if waited_on == Some(slot.attempts) {
                    return Err(Error::Initialization {
                        key: entry.key.clone(),
                        source: Arc::clone(cause),
                    });
                }
            }
            break;
        }

        slot.phase = Phase::Building;
        slot.attempts += 1;
        let attempt = slot.attempts;
        drop(slot);

        self.build(&entry, attempt)
    }

    /// Resolve a component and downcast it to its concrete type.
    pub fn resolve_as<T: Any + Send + Sync>(&self, key: impl Into<ComponentKey>) -> Result<Arc<T>> {
        let key = key.into();
        self.resolve(key.clone())?
            .downcast::<T>()
            .map_err(|_| Error::ComponentType {
                key,
                expected: type_name::<T>(),
            })
    }

    /// Run the factory outside the lock and publish the outcome.
    fn build(&self, entry: &RegistryEntry, attempt: u64) -> Result<Instance> {
        self.builds.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let outcome = match catch_unwind(AssertUnwindSafe(|| (entry.factory)())) {
            Ok(result) => result.map_err(InitCause::from),
            Err(panic) => Err(InitCause::from(BoxError::from(panic_message(panic.as_ref())))),
        };

        let mut slot = entry.slot.lock();
        let result = match outcome {
            Ok(instance) => {
                debug!(
                    component = %entry.key,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Component initialized"
                );
                slot.phase = Phase::Ready(Arc::clone(&instance));
                Ok(instance)
            }
            Err(cause) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    component = %entry.key,
                    attempt,
                    error = %cause,
                    "Component initialization failed; next access will retry"
                );
                slot.phase = Phase::Failed(Arc::clone(&cause));
                Err(Error::Initialization {
                    key: entry.key.clone(),
                    source: cause,
                })
            }
        };
        drop(slot);
        entry.built.notify_all();
        result
    }

    /// Check if a component is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Get all registered component keys, sorted.
    pub fn keys(&self) -> Vec<ComponentKey> {
        let mut keys: Vec<_> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Current state of a component, if registered.
    pub fn state(&self, key: &str) -> Option<ComponentState> {
        let entry = self.entries.read().get(key).cloned()?;
        let state = entry.slot.lock().phase.state();
        Some(state)
    }

    /// Get the number of currently built components.
    pub fn instantiated_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|e| matches!(e.slot.lock().phase, Phase::Ready(_)))
            .count()
    }

    /// Snapshot of registry counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            registered: self.entries.read().len(),
            ready: self.instantiated_count(),
            builds: self.builds.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    /// Eagerly build specific components.
    ///
    /// Stops at the first failure.
    pub fn prewarm(&self, keys: &[ComponentKey]) -> Result<()> {
        for key in keys {
            self.resolve(key.clone())?;
        }
        Ok(())
    }

    /// Eagerly build every registered component.
    pub fn prewarm_all(&self) -> Result<()> {
        self.prewarm(&self.keys())
    }
}

impl fmt::Debug for LazyComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyComponentRegistry")
            .field("registered", &self.keys())
            .field("instantiated_count", &self.instantiated_count())
            .field("sealed", &self.sealed.load(Ordering::Relaxed))
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("factory panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("factory panicked: {}", s)
    } else {
        "factory panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Heavy(u32);

    #[test]
    fn test_lazy_instantiation() {
        let registry = LazyComponentRegistry::new();
        registry
            .register("heavy", || Ok::<_, std::io::Error>(Heavy(7)))
            .unwrap();

        assert_eq!(registry.instantiated_count(), 0);
        assert_eq!(registry.state("heavy"), Some(ComponentState::Unbuilt));

        let first = registry.resolve_as::<Heavy>("heavy").unwrap();
        assert_eq!(first.0, 7);
        assert_eq!(registry.state("heavy"), Some(ComponentState::Ready));

        let second = registry.resolve_as::<Heavy>("heavy").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.stats().builds, 1);
        assert_eq!(registry.stats().hits, 1);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = LazyComponentRegistry::new();
        registry.register("dup", || Ok::<_, std::io::Error>(1u8)).unwrap();

        let err = registry
            .register("dup", || Ok::<_, std::io::Error>(2u8))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateComponent(ref k) if k.as_str() == "dup"));
    }

    #[test]
    fn test_register_after_resolve_is_rejected() {
        let registry = LazyComponentRegistry::new();
        registry.register("a", || Ok::<_, std::io::Error>(1u8)).unwrap();
        registry.resolve("a").unwrap();

        let err = registry
            .register("b", || Ok::<_, std::io::Error>(2u8))
            .unwrap_err();
        assert!(matches!(err, Error::RegistrySealed(_)));
    }

    #[test]
    fn test_unknown_component() {
        let registry = LazyComponentRegistry::new();
        assert!(matches!(
            registry.resolve("missing"),
            Err(Error::UnknownComponent(_))
        ));
        assert_eq!(registry.instantiated_count(), 0);
    }

    #[test]
    fn test_type_mismatch() {
        let registry = LazyComponentRegistry::new();
        registry.register("n", || Ok::<_, std::io::Error>(5u32)).unwrap();
        assert!(matches!(
            registry.resolve_as::<String>("n"),
            Err(Error::ComponentType { .. })
        ));
    }

    #[test]
    fn test_failed_build_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let registry = LazyComponentRegistry::new();
        registry
            .register("flaky", move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    ))
                } else {
                    Ok(Heavy(1))
                }
            })
            .unwrap();

        let err = registry.resolve("flaky").unwrap_err();
        assert!(matches!(err, Error::Initialization { .. }));
        assert_eq!(registry.state("flaky"), Some(ComponentState::Failed));

        let heavy = registry.resolve_as::<Heavy>("flaky").unwrap();
        assert_eq!(heavy.0, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.stats().failures, 1);
    }

    #[test]
    fn test_panicking_factory_becomes_failure() {
        let registry = LazyComponentRegistry::new();
        registry
            .register("boom", || -> std::result::Result<u8, std::io::Error> {
                panic!("out of memory")
            })
            .unwrap();

        let err = registry.resolve("boom").unwrap_err();
        assert!(err.to_string().contains("out of memory"));
        assert_eq!(registry.state("boom"), Some(ComponentState::Failed));
    }

    #[test]
    fn test_prewarm_all() {
        let registry = LazyComponentRegistry::new();
        registry.register("a", || Ok::<_, std::io::Error>(1u8)).unwrap();
        registry.register("b", || Ok::<_, std::io::Error>(2u8)).unwrap();

        registry.prewarm_all().unwrap();
        assert_eq!(registry.instantiated_count(), 2);
        assert_eq!(
            registry.keys(),
            vec![ComponentKey::from("a"), ComponentKey::from("b")]
        );
    }
}
