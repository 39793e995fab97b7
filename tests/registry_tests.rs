//! Integration tests for the lazy component registry
//!
//! Covers:
//! - Exactly one build under concurrent first access
//! - Waiters on a failing build sharing its error
//! - Retry after a failed build
//! - Panicking factories
//! - Registration rules once resolution has begun

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use leanserve::error::Error;
use leanserve::startup::{ComponentState, LazyComponentRegistry};

#[derive(Debug)]
struct Model {
    id: usize,
}

#[test]
fn test_concurrent_resolve_builds_once() {
    const THREADS: usize = 16;

    let registry = Arc::new(LazyComponentRegistry::new());
    let builds = Arc::new(AtomicUsize::new(0));
    {
        let builds = Arc::clone(&builds);
        registry
            .register("model", move || {
                let id = builds.fetch_add(1, Ordering::SeqCst);
                // Long enough for every thread to pile up behind the build.
                thread::sleep(Duration::from_millis(50));
                Ok::<_, std::io::Error>(Model { id })
            })
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.resolve_as::<Model>("model").unwrap()
            })
        })
        .collect();

    let models: Vec<Arc<Model>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    assert_eq!(models[0].id, 0);
    assert_eq!(registry.state("model"), Some(ComponentState::Ready));
    assert_eq!(registry.stats().builds, 1);
}

#[test]
fn test_concurrent_waiters_share_failed_build() {
    const THREADS: usize = 8;

    let registry = Arc::new(LazyComponentRegistry::new());
    let builds = Arc::new(AtomicUsize::new(0));
    {
        let builds = Arc::clone(&builds);
        registry
            .register("model", move || {
                builds.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(80));
                Err::<Model, _>("weights file missing")
            })
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.resolve_as::<Model>("model").unwrap_err()
            })
        })
        .collect();

    let errors: Vec<Error> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    let causes: Vec<_> = errors
        .iter()
        .map(|err| match err {
            Error::Initialization { source, .. } => Arc::clone(source),
            other => panic!("expected an initialization error, got {}", other),
        })
        .collect();
    assert!(causes.iter().all(|c| Arc::ptr_eq(c, &causes[0])));
    assert!(errors[0].to_string().contains("weights file missing"));
    assert_eq!(registry.state("model"), Some(ComponentState::Failed));
}

#[test]
fn test_failed_build_is_retried_on_next_resolve() {
    let registry = LazyComponentRegistry::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    {
        let attempts = Arc::clone(&attempts);
        registry
            .register("flaky", move || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("backend not reachable")
                } else {
                    Ok(Model { id: 7 })
                }
            })
            .unwrap();
    }

    let err = registry.resolve_as::<Model>("flaky").unwrap_err();
    assert!(matches!(err, Error::Initialization { .. }));
    assert!(err.to_string().contains("backend not reachable"));
    assert_eq!(registry.state("flaky"), Some(ComponentState::Failed));

    let model = registry.resolve_as::<Model>("flaky").unwrap();
    assert_eq!(model.id, 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(registry.state("flaky"), Some(ComponentState::Ready));
}

#[test]
fn test_panicking_factory_is_a_failed_build() {
    let registry = LazyComponentRegistry::new();
    registry
        .register("broken", || -> Result<Model, std::io::Error> {
            panic!("model file is corrupt")
        })
        .unwrap();

    let err = registry.resolve("broken").unwrap_err();
    assert!(matches!(err, Error::Initialization { .. }));
    assert_eq!(registry.state("broken"), Some(ComponentState::Failed));
}

#[test]
fn test_registration_closes_after_first_resolve() {
    let registry = LazyComponentRegistry::new();
    registry
        .register("a", || Ok::<_, std::io::Error>(1u32))
        .unwrap();
    registry.resolve("a").unwrap();

    let err = registry
        .register("b", || Ok::<_, std::io::Error>(2u32))
        .unwrap_err();
    assert!(matches!(err, Error::RegistrySealed(_)));
}

#[test]
fn test_wrong_type_is_reported() {
    let registry = LazyComponentRegistry::new();
    registry
        .register("count", || Ok::<_, std::io::Error>(3u64))
        .unwrap();

    let err = registry.resolve_as::<String>("count").unwrap_err();
    assert!(matches!(err, Error::ComponentType { .. }));
}

#[test]
fn test_unknown_component() {
    let registry = LazyComponentRegistry::new();
    assert!(matches!(
        registry.resolve("missing"),
        Err(Error::UnknownComponent(_))
    ));
}
