//! Service-readiness registry (§4.11): per-service state, dependencies,
//! and health, with capped exponential-backoff retry on failure.
//!
//! Grounded in `original_source/apps/file-brain/services/startup_checker.py`'s
//! per-check `CheckDetail`/aggregate-result shape, generalized from one
//! fixed set of named checks to an open registry of services the crawl
//! manager and CLI can query at runtime. Backoff tuning constants follow
//! the teacher's grouped-constants style (`utils/config.rs`'s
//! `HashingConsts`/`ProgressConsts`).

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{info, warn};

/// Backoff tuning for retrying a failed service (spec §4.11: "capped at 5 min").
pub struct ReadinessConsts;

impl ReadinessConsts {
    pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
    pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
    pub const BACKOFF_MULTIPLIER: u32 = 2;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceState {
    NotStarted,
    Initializing,
    Ready,
    Failed,
    Disabled,
}

struct ServiceEntry {
    state: ServiceState,
    depends_on: Vec<String>,
    next_retry_backoff: Duration,
    next_retry_at: Option<Instant>,
}

impl ServiceEntry {
    fn new(depends_on: Vec<String>) -> Self {
        Self {
            state: ServiceState::NotStarted,
            depends_on,
            next_retry_backoff: ReadinessConsts::INITIAL_BACKOFF,
            next_retry_at: None,
        }
    }
}

/// Registry of named services, each with a state and optional dependency
/// list. `isReady`/`waitFor` of spec §4.11 are [`Registry::is_ready`] and
/// [`Registry::wait_for`].
pub struct Registry {
    services: Mutex<HashMap<String, ServiceEntry>>,
    changed: Condvar,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
        }
    }

    /// Register `name` with optional dependencies. A service with
    /// dependencies can only become [`ServiceState::Ready`] once every
    /// dependency is itself ready.
    pub fn register(&self, name: impl Into<String>, depends_on: Vec<String>) {
        let mut services = self.services.lock().unwrap();
        services.insert(name.into(), ServiceEntry::new(depends_on));
    }

    pub fn set_initializing(&self, name: &str) {
        self.set_state(name, ServiceState::Initializing);
    }

    pub fn set_disabled(&self, name: &str) {
        self.set_state(name, ServiceState::Disabled);
    }

    /// Mark `name` ready, but only if every dependency is already ready.
    /// Returns `false` (and leaves the state unchanged) if a dependency
    /// isn't ready yet.
    pub fn set_ready(&self, name: &str) -> bool {
        let mut services = self.services.lock().unwrap();
        let deps_ready = {
            let Some(entry) = services.get(name) else {
                warn!("readiness: set_ready on unregistered service {name}");
                return false;
            };
            entry
                .depends_on
                .iter()
                .all(|dep| services.get(dep).map(|e| e.state == ServiceState::Ready).unwrap_or(false))
        };
        if !deps_ready {
            return false;
        }
        if let Some(entry) = services.get_mut(name) {
            entry.state = ServiceState::Ready;
            entry.next_retry_backoff = ReadinessConsts::INITIAL_BACKOFF;
            entry.next_retry_at = None;
        }
        info!("readiness: {name} is ready");
        drop(services);
        self.changed.notify_all();
        true
    }

    /// Mark `name` failed and schedule its next retry with capped
    /// exponential backoff (spec §4.11).
    pub fn set_failed(&self, name: &str) {
        let mut services = self.services.lock().unwrap();
        if let Some(entry) = services.get_mut(name) {
            entry.state = ServiceState::Failed;
            entry.next_retry_at = Some(Instant::now() + entry.next_retry_backoff);
            entry.next_retry_backoff = (entry.next_retry_backoff * ReadinessConsts::BACKOFF_MULTIPLIER).min(ReadinessConsts::MAX_BACKOFF);
            warn!("readiness: {name} failed, next retry in {:?}", entry.next_retry_backoff);
        }
        drop(services);
        self.changed.notify_all();
    }

    fn set_state(&self, name: &str, state: ServiceState) {
        let mut services = self.services.lock().unwrap();
        if let Some(entry) = services.get_mut(name) {
            entry.state = state;
        }
        drop(services);
        self.changed.notify_all();
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.services.lock().unwrap().get(name).map(|e| e.state)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.state(name) == Some(ServiceState::Ready)
    }

    /// True once `next_retry_at` (set on the last failure) has passed.
    pub fn due_for_retry(&self, name: &str) -> bool {
        let services = self.services.lock().unwrap();
        services
            .get(name)
            .and_then(|e| e.next_retry_at)
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }

    /// Block up to `timeout` for `name` to become ready. Returns the final
    /// observed state once ready or once time runs out.
    pub fn wait_for(&self, name: &str, timeout: Duration) -> Option<ServiceState> {
        let services = self.services.lock().unwrap();
        if !services.contains_key(name) {
            return None;
        }
        let deadline = Instant::now() + timeout;
        let mut services = services;
        loop {
            if let Some(entry) = services.get(name) {
                if entry.state == ServiceState::Ready {
                    return Some(entry.state);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return services.get(name).map(|e| e.state);
            }
            let (guard, _timeout_result) = self.changed.wait_timeout(services, deadline - now).unwrap();
            services = guard;
        }
    }
}

pub type SharedRegistry = Arc<Registry>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn service_with_no_dependencies_becomes_ready_immediately() {
        let registry = Registry::new();
        registry.register("search-engine", vec![]);
        assert!(registry.set_ready("search-engine"));
        assert!(registry.is_ready("search-engine"));
    }

    #[test]
    fn service_cannot_become_ready_before_its_dependency() {
        let registry = Registry::new();
        registry.register("persistence", vec![]);
        registry.register("crawl-manager", vec!["persistence".into()]);

        assert!(!registry.set_ready("crawl-manager"));
        assert!(!registry.is_ready("crawl-manager"));

        registry.set_ready("persistence");
        assert!(registry.set_ready("crawl-manager"));
    }

    #[test]
    fn failure_schedules_a_growing_retry_backoff() {
        let registry = Registry::new();
        registry.register("extraction-service", vec![]);
        registry.set_failed("extraction-service");
        assert!(!registry.due_for_retry("extraction-service"));
        assert_eq!(registry.state("extraction-service"), Some(ServiceState::Failed));
    }

    #[test]
    fn wait_for_unblocks_once_another_thread_marks_ready() {
        let registry = Arc::new(Registry::new());
        registry.register("search-engine", vec![]);

        let registry2 = registry.clone();
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            registry2.set_ready("search-engine");
        });

        let state = registry.wait_for("search-engine", Duration::from_secs(2));
        assert_eq!(state, Some(ServiceState::Ready));
        setter.join().unwrap();
    }

    #[test]
    fn wait_for_times_out_on_a_service_that_never_becomes_ready() {
        let registry = Registry::new();
        registry.register("model-downloader", vec![]);
        let state = registry.wait_for("model-downloader", Duration::from_millis(30));
        assert_eq!(state, Some(ServiceState::NotStarted));
    }

    #[test]
    fn wait_for_unregistered_service_returns_none() {
        let registry = Registry::new();
        assert_eq!(registry.wait_for("ghost", Duration::from_millis(10)), None);
    }
}
