//! Dependency injection container.
//!
//! Services are registered by name on a [`ContainerBuilder`] before the
//! application starts. Each registration is a factory that receives the
//! [`Container`] so it can resolve its own dependencies.
//!
//! - Singletons are created on the first [`Container::get`] and cached.
//! - Transients run their factory on every `get` and are never cached.
//! - [`Container::start`] resolves every service in registration order and
//!   runs its [`Lifecycle::start`] hook.
//! - [`Container::stop`] runs [`Lifecycle::stop`] in reverse registration
//!   order, for instantiated singletons only, and empties the cache.
//!
//! # Example
//!
//! ```rust
//! use kanto_core::di::ContainerBuilder;
//!
//! let container = ContainerBuilder::new()
//!     .register("a", |_| Ok(1_i32))?
//!     .register("b", |c| Ok(*c.get::<i32>("a")? + 1))?
//!     .build();
//!
//! assert_eq!(*container.get::<i32>("b")?, 2);
//! # Ok::<(), kanto_core::ContainerError>(())
//! ```

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex};
use thiserror::Error;

use crate::handler::BoxFuture;

/// Errors raised by the container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A service name was registered twice.
    #[error("service '{name}' is already registered")]
    DuplicateService {
        /// The service name.
        name: String,
    },

    /// No service is registered under this name.
    #[error("service '{name}' is not registered")]
    NotRegistered {
        /// The service name.
        name: String,
    },

    /// The service exists but has a different type.
    #[error("service '{name}' is not of type {expected}")]
    TypeMismatch {
        /// The service name.
        name: String,
        /// The requested type.
        expected: &'static str,
    },

    /// A factory resolved a service that is still being constructed.
    #[error("circular dependency while resolving service '{name}'")]
    CircularDependency {
        /// The service name.
        name: String,
    },

    /// A factory failed.
    #[error("factory for service '{name}' failed")]
    Factory {
        /// The service name.
        name: String,
        /// The factory error.
        #[source]
        source: anyhow::Error,
    },

    /// A start or stop hook failed.
    #[error("{phase} hook of service '{name}' failed")]
    Lifecycle {
        /// The service name.
        name: String,
        /// `start` or `stop`.
        phase: &'static str,
        /// The hook error.
        #[source]
        source: anyhow::Error,
    },

    /// The container has been stopped.
    #[error("container is stopped")]
    Stopped,
}

/// Start and stop hooks for a service.
///
/// Both hooks default to doing nothing.
///
/// # Example
///
/// ```rust
/// use kanto_core::{BoxFuture, Lifecycle};
///
/// struct CardStore;
///
/// impl Lifecycle for CardStore {
///     fn start(&self) -> BoxFuture<'_, anyhow::Result<()>> {
///         Box::pin(async {
///             // open the database
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Lifecycle: Send + Sync + 'static {
    /// Called by [`Container::start`], in registration order.
    fn start(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Called by [`Container::stop`], in reverse registration order.
    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifetime {
    /// One instance per container, created lazily.
    Singleton,
    /// A fresh instance on every resolution.
    Transient,
}

/// Lifecycle state of a [`Container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Built, not started.
    Ready,
    /// `start` completed.
    Started,
    /// `stop` is running or failed part way; lookups are rejected.
    Stopping,
    /// `stop` completed.
    Stopped,
}

/// Typed name of a service.
///
/// Keys tie a service name to its type so handlers do not repeat the type at
/// every lookup.
///
/// ```rust
/// use kanto_core::{ContainerBuilder, ServiceKey};
///
/// struct Pokedex(Vec<&'static str>);
///
/// const POKEDEX: ServiceKey<Pokedex> = ServiceKey::new("pokedex");
///
/// let container = ContainerBuilder::new()
///     .provide(&POKEDEX, |_| Ok(Pokedex(vec!["bulbasaur"])))?
///     .build();
///
/// assert_eq!(container.resolve(&POKEDEX)?.0.len(), 1);
/// # Ok::<(), kanto_core::ContainerError>(())
/// ```
pub struct ServiceKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ServiceKey<T> {
    /// Creates a key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the service name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ServiceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ServiceKey<T> {}

impl<T> fmt::Debug for ServiceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.name).finish()
    }
}

#[derive(Clone)]
struct Resolved {
    instance: Arc<dyn Any + Send + Sync>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

type Factory = Box<dyn Fn(&Container) -> anyhow::Result<Resolved> + Send + Sync>;

enum Slot {
    Empty,
    Resolving,
    Ready(Resolved),
}

struct Registration {
    lifetime: ServiceLifetime,
    factory: Factory,
    // Reentrant so a factory resolving its own name on this thread is
    // reported as a cycle instead of deadlocking.
    slot: ReentrantMutex<RefCell<Slot>>,
}

thread_local! {
    // Transient resolutions in progress on this thread, keyed by container.
    static TRANSIENT_STACK: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a transient as being resolved on the current thread.
struct TransientFrame;

impl TransientFrame {
    fn enter(container: &Container, name: &str) -> Result<Self, ContainerError> {
        let id = container as *const Container as usize;
        TRANSIENT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(c, n)| *c == id && n == name) {
                return Err(ContainerError::CircularDependency {
                    name: name.to_string(),
                });
            }
            stack.push((id, name.to_string()));
            Ok(Self)
        })
    }
}

impl Drop for TransientFrame {
    fn drop(&mut self) {
        TRANSIENT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Collects service registrations.
///
/// Registration is only possible here; [`build`](Self::build) freezes the
/// set of services.
#[derive(Default)]
pub struct ContainerBuilder {
    registrations: IndexMap<String, Registration>,
}

impl ContainerBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a singleton.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::DuplicateService`] if the name is taken.
    pub fn register<T, F>(self, name: impl Into<String>, factory: F) -> Result<Self, ContainerError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(name.into(), ServiceLifetime::Singleton, plain(factory))
    }

    /// Registers a transient.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::DuplicateService`] if the name is taken.
    pub fn register_transient<T, F>(
        self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<Self, ContainerError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(name.into(), ServiceLifetime::Transient, plain(factory))
    }

    /// Registers a singleton with start and stop hooks.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::DuplicateService`] if the name is taken.
    pub fn register_service<T, F>(
        self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<Self, ContainerError>
    where
        T: Lifecycle,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(name.into(), ServiceLifetime::Singleton, managed(factory))
    }

    /// Registers a transient with start and stop hooks.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::DuplicateService`] if the name is taken.
    pub fn register_transient_service<T, F>(
        self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<Self, ContainerError>
    where
        T: Lifecycle,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(name.into(), ServiceLifetime::Transient, managed(factory))
    }

    /// Registers a singleton under a typed key.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::DuplicateService`] if the name is taken.
    pub fn provide<T, F>(self, key: &ServiceKey<T>, factory: F) -> Result<Self, ContainerError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.register(key.name(), factory)
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Freezes the registrations into a container.
    #[must_use]
    pub fn build(self) -> Arc<Container> {
        Arc::new(Container {
            registrations: self.registrations,
            state: Mutex::new(ContainerState::Ready),
        })
    }

    fn insert(
        mut self,
        name: String,
        lifetime: ServiceLifetime,
        factory: Factory,
    ) -> Result<Self, ContainerError> {
        if self.registrations.contains_key(&name) {
            return Err(ContainerError::DuplicateService { name });
        }
        tracing::debug!(service = %name, ?lifetime, "registered service");
        self.registrations.insert(
            name,
            Registration {
                lifetime,
                factory,
                slot: ReentrantMutex::new(RefCell::new(Slot::Empty)),
            },
        );
        Ok(self)
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("services", &self.registrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn plain<T, F>(factory: F) -> Factory
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Box::new(move |c| {
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(factory(c)?);
        Ok(Resolved {
            instance,
            lifecycle: None,
        })
    })
}

fn managed<T, F>(factory: F) -> Factory
where
    T: Lifecycle,
    F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Box::new(move |c| {
        let service = Arc::new(factory(c)?);
        let lifecycle: Arc<dyn Lifecycle> = service.clone();
        Ok(Resolved {
            instance: service,
            lifecycle: Some(lifecycle),
        })
    })
}

/// Resolves named services and runs their lifecycle hooks.
pub struct Container {
    registrations: IndexMap<String, Registration>,
    state: Mutex<ContainerState>,
}

impl Container {
    /// Resolves a service by name.
    ///
    /// # Errors
    ///
    /// Fails when the name is unknown, the type does not match, the factory
    /// fails, a dependency cycle is detected, or the container is stopped.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        self.resolve_any(name)?
            .instance
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Resolves a service by typed key.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        key: &ServiceKey<T>,
    ) -> Result<Arc<T>, ContainerError> {
        self.get(key.name())
    }

    /// Returns `true` if a service is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    /// Returns the registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registrations.keys().map(String::as_str)
    }

    /// Returns the lifetime of a registration.
    #[must_use]
    pub fn lifetime(&self, name: &str) -> Option<ServiceLifetime> {
        self.registrations.get(name).map(|r| r.lifetime)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContainerState {
        *self.state.lock()
    }

    /// Returns `true` if the singleton `name` has been instantiated.
    #[must_use]
    pub fn is_instantiated(&self, name: &str) -> bool {
        self.registrations.get(name).is_some_and(|r| {
            let slot = r.slot.lock();
            let instantiated = matches!(*slot.borrow(), Slot::Ready(_));
            instantiated
        })
    }

    /// Resolves every service in registration order and awaits its start hook.
    ///
    /// Calling `start` on a started container does nothing.
    ///
    /// # Errors
    ///
    /// The first resolution or hook failure is returned and later services
    /// are not started.
    pub async fn start(&self) -> Result<(), ContainerError> {
        match self.state() {
            ContainerState::Started => return Ok(()),
            ContainerState::Stopping | ContainerState::Stopped => {
                return Err(ContainerError::Stopped)
            }
            ContainerState::Ready => {}
        }

        for name in self.registrations.keys() {
            let resolved = self.resolve_any(name)?;
            if let Some(lifecycle) = resolved.lifecycle {
                tracing::debug!(service = %name, "starting service");
                lifecycle
                    .start()
                    .await
                    .map_err(|source| ContainerError::Lifecycle {
                        name: name.clone(),
                        phase: "start",
                        source,
                    })?;
            }
        }

        *self.state.lock() = ContainerState::Started;
        tracing::debug!(services = self.registrations.len(), "container started");
        Ok(())
    }

    /// Stops instantiated singletons in reverse registration order.
    ///
    /// Each instance leaves the cache once its stop hook succeeded. Stopping
    /// a stopped container does nothing. Lookups fail with
    /// [`ContainerError::Stopped`] as soon as stopping begins.
    ///
    /// # Errors
    ///
    /// The first hook failure is returned immediately; services earlier in
    /// registration order stay cached and the container stays `Stopping`.
    pub async fn stop(&self) -> Result<(), ContainerError> {
        {
            let mut state = self.state.lock();
            if *state == ContainerState::Stopped {
                return Ok(());
            }
            *state = ContainerState::Stopping;
        }

        for (name, registration) in self.registrations.iter().rev() {
            let cached = {
                let slot = registration.slot.lock();
                let cached = match &*slot.borrow() {
                    Slot::Ready(resolved) => Some(resolved.clone()),
                    _ => None,
                };
                cached
            };
            let Some(resolved) = cached else { continue };

            if let Some(lifecycle) = resolved.lifecycle {
                tracing::debug!(service = %name, "stopping service");
                lifecycle
                    .stop()
                    .await
                    .map_err(|source| ContainerError::Lifecycle {
                        name: name.clone(),
                        phase: "stop",
                        source,
                    })?;
            }

            let slot = registration.slot.lock();
            *slot.borrow_mut() = Slot::Empty;
        }

        *self.state.lock() = ContainerState::Stopped;
        tracing::debug!("container stopped");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        matches!(
            self.state(),
            ContainerState::Stopping | ContainerState::Stopped
        )
    }

    fn resolve_any(&self, name: &str) -> Result<Resolved, ContainerError> {
        if self.is_closed() {
            return Err(ContainerError::Stopped);
        }
        let registration =
            self.registrations
                .get(name)
                .ok_or_else(|| ContainerError::NotRegistered {
                    name: name.to_string(),
                })?;

        if registration.lifetime == ServiceLifetime::Transient {
            let _frame = TransientFrame::enter(self, name)?;
            return (registration.factory)(self).map_err(|e| factory_error(name, e));
        }

        let slot = registration.slot.lock();
        {
            let mut state = slot.borrow_mut();
            match &*state {
                Slot::Ready(resolved) => return Ok(resolved.clone()),
                Slot::Resolving => {
                    return Err(ContainerError::CircularDependency {
                        name: name.to_string(),
                    })
                }
                // `stop` may have cleared this slot after the check above.
                Slot::Empty if self.is_closed() => return Err(ContainerError::Stopped),
                Slot::Empty => {}
            }
            *state = Slot::Resolving;
        }

        let result = (registration.factory)(self);
        let mut state = slot.borrow_mut();
        match result {
            Ok(resolved) => {
                *state = Slot::Ready(resolved.clone());
                tracing::debug!(service = %name, "instantiated singleton");
                Ok(resolved)
            }
            Err(e) => {
                *state = Slot::Empty;
                Err(factory_error(name, e))
            }
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.registrations.keys().collect::<Vec<_>>())
            .field("state", &self.state())
            .finish()
    }
}

// Container errors raised by nested resolutions pass through unchanged.
fn factory_error(name: &str, err: anyhow::Error) -> ContainerError {
    match err.downcast::<ContainerError>() {
        Ok(inner) => inner,
        Err(source) => ContainerError::Factory {
            name: name.to_string(),
            source,
        },
    }
}

/// Read-only view over the container, carried by every request context.
#[derive(Clone, Default)]
pub struct Services {
    container: Option<Arc<Container>>,
}

impl Services {
    /// A view with no container behind it.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A view over `container`.
    #[must_use]
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            container: Some(container),
        }
    }

    /// Resolves a service by name.
    ///
    /// # Errors
    ///
    /// See [`Container::get`]. Without a container every lookup fails with
    /// [`ContainerError::NotRegistered`].
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        match &self.container {
            Some(container) => container.get(name),
            None => Err(ContainerError::NotRegistered {
                name: name.to_string(),
            }),
        }
    }

    /// Resolves a service by typed key.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        key: &ServiceKey<T>,
    ) -> Result<Arc<T>, ContainerError> {
        self.get(key.name())
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.container.as_ref().is_some_and(|c| c.contains(name))
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("container", &self.container.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        fail_stop: bool,
    }

    impl Lifecycle for Recorder {
        fn start(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                self.log.lock().push(format!("start:{}", self.name));
                Ok(())
            })
        }

        fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                if self.fail_stop {
                    anyhow::bail!("{} refused to stop", self.name);
                }
                self.log.lock().push(format!("stop:{}", self.name));
                Ok(())
            })
        }
    }

    fn recorder(name: &'static str, log: &Log) -> Recorder {
        Recorder {
            name,
            log: log.clone(),
            fail_stop: false,
        }
    }

    #[test]
    fn test_dependency_chain() {
        let container = ContainerBuilder::new()
            .register("a", |_| Ok(1_i32))
            .unwrap()
            .register("b", |c| Ok(*c.get::<i32>("a")? + 1))
            .unwrap()
            .build();

        assert_eq!(*container.get::<i32>("b").unwrap(), 2);
    }

    #[test]
    fn test_singleton_factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let container = ContainerBuilder::new()
            .register("db", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("sqlite://cards.db"))
            })
            .unwrap()
            .build();

        let first = container.get::<String>("db").unwrap();
        let second = container.get::<String>("db").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_factory_runs_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let container = ContainerBuilder::new()
            .register_transient("token", move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)))
            .unwrap()
            .build();

        for _ in 0..3 {
            container.get::<usize>("token").unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!container.is_instantiated("token"));
    }

    #[test]
    fn test_duplicate_registration() {
        let err = ContainerBuilder::new()
            .register("a", |_| Ok(1_u8))
            .unwrap()
            .register("a", |_| Ok(2_u8))
            .unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateService { name } if name == "a"));
    }

    #[test]
    fn test_not_registered() {
        let container = ContainerBuilder::new().build();
        let err = container.get::<u8>("missing").unwrap_err();
        assert!(matches!(err, ContainerError::NotRegistered { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let container = ContainerBuilder::new()
            .register("a", |_| Ok(1_i32))
            .unwrap()
            .build();
        let err = container.get::<String>("a").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_circular_dependency() {
        let container = ContainerBuilder::new()
            .register("a", |c| Ok(*c.get::<i32>("b")?))
            .unwrap()
            .register("b", |c| Ok(*c.get::<i32>("a")?))
            .unwrap()
            .build();

        let err = container.get::<i32>("a").unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency { .. }));
        assert!(!container.is_instantiated("a"));
        assert!(!container.is_instantiated("b"));
    }

    #[test]
    fn test_transient_cycle_is_reported() {
        let container = ContainerBuilder::new()
            .register_transient("a", |c| Ok(*c.get::<i32>("b")?))
            .unwrap()
            .register_transient("b", |c| Ok(*c.get::<i32>("a")?))
            .unwrap()
            .build();

        let err = container.get::<i32>("a").unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency { ref name } if name == "a"));

        // The resolution stack unwinds, so unrelated lookups still work.
        let other = ContainerBuilder::new()
            .register_transient("x", |_| Ok(1_i32))
            .unwrap()
            .register_transient("y", |c| Ok(*c.get::<i32>("x")? + *c.get::<i32>("x")?))
            .unwrap()
            .build();
        assert_eq!(*other.get::<i32>("y").unwrap(), 2);
    }

    #[test]
    fn test_factory_error() {
        let container = ContainerBuilder::new()
            .register::<u8, _>("broken", |_| anyhow::bail!("no database file"))
            .unwrap()
            .build();
        let err = container.get::<u8>("broken").unwrap_err();
        assert!(matches!(err, ContainerError::Factory { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_typed_key() {
        const SETS: ServiceKey<Vec<&'static str>> = ServiceKey::new("sets");

        let container = ContainerBuilder::new()
            .provide(&SETS, |_| Ok(vec!["base1", "jungle"]))
            .unwrap()
            .build();
        let services = Services::new(container);
        assert_eq!(services.resolve(&SETS).unwrap().len(), 2);
        assert!(services.contains("sets"));
    }

    #[test]
    fn test_empty_services() {
        let services = Services::empty();
        assert!(services.get::<u8>("anything").is_err());
        assert!(!services.contains("anything"));
    }

    #[test]
    fn test_concurrent_first_get_creates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let container = ContainerBuilder::new()
            .register("slow", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                Ok(42_u64)
            })
            .unwrap()
            .build();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = container.clone();
                std::thread::spawn(move || *container.get::<u64>("slow").unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_in_registration_order() {
        let log: Log = Arc::default();
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let container = ContainerBuilder::new()
            .register_service("first", move |_| Ok(recorder("first", &l1)))
            .unwrap()
            .register_service("second", move |_| Ok(recorder("second", &l2)))
            .unwrap()
            .register_service("third", move |_| Ok(recorder("third", &l3)))
            .unwrap()
            .build();

        container.start().await.unwrap();
        assert_eq!(container.state(), ContainerState::Started);
        assert_eq!(
            *log.lock(),
            vec!["start:first", "start:second", "start:third"]
        );
    }

    #[tokio::test]
    async fn test_stop_reverse_order_only_resolved() {
        let log: Log = Arc::default();
        let (la, lb, lc) = (log.clone(), log.clone(), log.clone());
        let container = ContainerBuilder::new()
            .register_service("a", move |_| Ok(recorder("a", &la)))
            .unwrap()
            .register_service("b", move |_| Ok(recorder("b", &lb)))
            .unwrap()
            .register_service("c", move |_| Ok(recorder("c", &lc)))
            .unwrap()
            .build();

        container.get::<Recorder>("a").unwrap();
        container.get::<Recorder>("c").unwrap();
        container.stop().await.unwrap();

        assert_eq!(*log.lock(), vec!["stop:c", "stop:a"]);
        assert!(!container.is_instantiated("a"));
        assert!(!container.is_instantiated("c"));
        assert_eq!(container.state(), ContainerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let log: Log = Arc::default();
        let l = log.clone();
        let container = ContainerBuilder::new()
            .register_service("a", move |_| Ok(recorder("a", &l)))
            .unwrap()
            .build();

        container.start().await.unwrap();
        container.stop().await.unwrap();
        container.stop().await.unwrap();
        assert_eq!(*log.lock(), vec!["start:a", "stop:a"]);
    }

    #[tokio::test]
    async fn test_get_after_stop_fails() {
        let container = ContainerBuilder::new()
            .register("a", |_| Ok(1_u8))
            .unwrap()
            .build();
        container.get::<u8>("a").unwrap();
        container.stop().await.unwrap();

        assert!(matches!(
            container.get::<u8>("a"),
            Err(ContainerError::Stopped)
        ));
        assert!(matches!(
            container.start().await,
            Err(ContainerError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_stop_failure_propagates() {
        let log: Log = Arc::default();
        let (la, lb) = (log.clone(), log.clone());
        let container = ContainerBuilder::new()
            .register_service("a", move |_| Ok(recorder("a", &la)))
            .unwrap()
            .register_service("b", move |_| {
                Ok(Recorder {
                    fail_stop: true,
                    ..recorder("b", &lb)
                })
            })
            .unwrap()
            .build();

        container.start().await.unwrap();
        let err = container.stop().await.unwrap_err();
        assert!(matches!(err, ContainerError::Lifecycle { phase: "stop", .. }));
        assert!(container.is_instantiated("a"));
        assert_ne!(container.state(), ContainerState::Stopped);
    }

    struct Gate {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    impl Lifecycle for Gate {
        fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
            Box::pin(async move {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_lookups_rejected_while_stopping() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let (e, r) = (entered.clone(), release.clone());
        let container = ContainerBuilder::new()
            .register_service("gate", move |_| {
                Ok(Gate {
                    entered: e.clone(),
                    release: r.clone(),
                })
            })
            .unwrap()
            .register("cache", |_| Ok(String::from("warm")))
            .unwrap()
            .build();
        container.start().await.unwrap();

        let stopping = tokio::spawn({
            let container = Arc::clone(&container);
            async move { container.stop().await }
        });
        entered.notified().await;

        assert_eq!(container.state(), ContainerState::Stopping);
        assert!(!container.is_instantiated("cache"));
        assert!(matches!(
            container.get::<String>("cache"),
            Err(ContainerError::Stopped)
        ));
        assert!(!container.is_instantiated("cache"));

        release.notify_one();
        stopping.await.unwrap().unwrap();
        assert_eq!(container.state(), ContainerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_resolves_plain_services() {
        let container = ContainerBuilder::new()
            .register("config", |_| Ok("prod"))
            .unwrap()
            .build();
        container.start().await.unwrap();
        assert!(container.is_instantiated("config"));
    }

    #[tokio::test]
    async fn test_transient_started_but_never_stopped() {
        let log: Log = Arc::default();
        let l = log.clone();
        let container = ContainerBuilder::new()
            .register_transient_service("job", move |_| Ok(recorder("job", &l)))
            .unwrap()
            .build();

        container.start().await.unwrap();
        container.stop().await.unwrap();
        assert_eq!(*log.lock(), vec!["start:job"]);
    }
}
