//! Deferred - Values that become known after resources are registered
//!
//! A [`DeferredValue`] is a handle to a result the resource-graph engine will
//! push in later. Composition (`map`, `try_map`, `zip`, `all`) returns a new
//! handle immediately and runs its callback once every input has settled.
//! Each handle carries the set of resources it was derived from, so the
//! engine can order work by following the dependency edges.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::resource::ResourceId;

/// Failure carried by a deferred value
///
/// One failure fans out to every value derived from it, so this is `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The provider could not produce the resource's properties
    #[error("[{resource}] provider error: {message}")]
    Provider {
        resource: ResourceId,
        message: String,
    },

    /// The scheduler gave up on the value before settling it
    #[error("Resolution was cancelled")]
    Cancelled,

    /// A requested output is absent from the resolved output map
    #[error("[{resource}] output '{name}' not found")]
    MissingOutput { resource: ResourceId, name: String },

    /// A property required by the binding is absent or has the wrong shape
    #[error("[{resource}] invalid property '{name}': {message}")]
    InvalidProperty {
        resource: ResourceId,
        name: String,
        message: String,
    },
}

impl ResolutionError {
    pub fn provider(resource: ResourceId, message: impl Into<String>) -> Self {
        Self::Provider {
            resource,
            message: message.into(),
        }
    }

    pub fn missing_output(resource: ResourceId, name: impl Into<String>) -> Self {
        Self::MissingOutput {
            resource,
            name: name.into(),
        }
    }

    pub fn invalid_property(
        resource: ResourceId,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidProperty {
            resource,
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Settled state of a deferred value
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// The value is known
    Known(T),
    /// The value will not be known during this run (e.g., dry-run preview)
    Unknown,
    /// Resolution failed
    Failed(ResolutionError),
}

impl<T> Resolution<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Resolution::Known(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Resolution::Failed(_))
    }

    /// Convert into a `Result`, mapping `Unknown` to `Ok(None)`
    pub fn into_result(self) -> Result<Option<T>, ResolutionError> {
        match self {
            Resolution::Known(value) => Ok(Some(value)),
            Resolution::Unknown => Ok(None),
            Resolution::Failed(error) => Err(error),
        }
    }
}

type Subscriber<T> = Box<dyn FnOnce(&Resolution<T>) + Send>;

enum Slot<T> {
    Pending(Vec<Subscriber<T>>),
    Settled(Arc<Resolution<T>>),
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Shared<T> {
    fn peek(&self) -> Option<Arc<Resolution<T>>> {
        match &*lock(&self.slot) {
            Slot::Pending(_) => None,
            Slot::Settled(resolution) => Some(Arc::clone(resolution)),
        }
    }
}

impl<T: 'static> Shared<T> {
    fn pending() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending(Vec::new())),
        }
    }

    fn settled(resolution: Resolution<T>) -> Self {
        Self {
            slot: Mutex::new(Slot::Settled(Arc::new(resolution))),
        }
    }

    /// Settle once; later calls are ignored. Subscribers run outside the lock.
    fn settle(&self, resolution: Resolution<T>) {
        let resolution = Arc::new(resolution);
        let subscribers = {
            let mut slot = lock(&self.slot);
            let subscribers = match &mut *slot {
                Slot::Settled(_) => return,
                Slot::Pending(subscribers) => std::mem::take(subscribers),
            };
            *slot = Slot::Settled(Arc::clone(&resolution));
            subscribers
        };

        dispatch(subscribers.into_iter().map(|subscriber| {
            let resolution = Arc::clone(&resolution);
            Box::new(move || subscriber(&*resolution)) as Job
        }));
    }

    fn subscribe(&self, subscriber: impl FnOnce(&Resolution<T>) + Send + 'static) {
        let settled = {
            let mut slot = lock(&self.slot);
            match &mut *slot {
                Slot::Pending(subscribers) => {
                    subscribers.push(Box::new(subscriber));
                    return;
                }
                Slot::Settled(resolution) => Arc::clone(resolution),
            }
        };
        subscriber(&*settled);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Job = Box<dyn FnOnce()>;

thread_local! {
    /// Subscribers waiting to run; `Some` while this thread is draining
    static SETTLEMENTS: RefCell<Option<VecDeque<Job>>> = const { RefCell::new(None) };
}

/// Run subscriber jobs without nesting them on the stack
///
/// A settlement triggered from inside a subscriber is queued and run by the
/// outermost call on this thread, so chains of any depth use constant stack.
fn dispatch(jobs: impl IntoIterator<Item = Job>) {
    let mut jobs = Some(jobs);
    let draining = SETTLEMENTS.try_with(|queue| {
        let mut queue = queue.borrow_mut();
        let draining = queue.is_some();
        queue
            .get_or_insert_with(VecDeque::new)
            .extend(jobs.take().into_iter().flatten());
        draining
    });
    match draining {
        Ok(true) => return,
        Ok(false) => {}
        // Thread-local storage is being torn down
        Err(_) => {
            jobs.into_iter().flatten().for_each(|job| job());
            return;
        }
    }

    let _drain = Drain;
    while let Some(job) =
        SETTLEMENTS.with(|queue| queue.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    {
        job();
    }
}

/// Closes the queue when the outermost `dispatch` returns or unwinds
struct Drain;

impl Drop for Drain {
    fn drop(&mut self) {
        // Abandoned jobs are dropped after the borrow ends; their resolvers
        // cancel through a fresh dispatch.
        let abandoned = SETTLEMENTS.try_with(|queue| queue.borrow_mut().take());
        drop(abandoned);
    }
}

/// Completion handle for a pending [`DeferredValue`]
///
/// Held by whoever drives resolution. Every settling method consumes the
/// handle, so a value settles at most once. Dropping an unsettled resolver
/// fails the value with [`ResolutionError::Cancelled`].
pub struct Resolver<T: 'static> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T: 'static> Resolver<T> {
    pub fn resolve(self, value: T) {
        self.settle(Resolution::Known(value));
    }

    pub fn fail(self, error: ResolutionError) {
        self.settle(Resolution::Failed(error));
    }

    pub fn mark_unknown(self) {
        self.settle(Resolution::Unknown);
    }

    pub fn settle(mut self, resolution: Resolution<T>) {
        if let Some(shared) = self.shared.take() {
            shared.settle(resolution);
        }
    }
}

impl<T: 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.settle(Resolution::Failed(ResolutionError::Cancelled));
        }
    }
}

impl<T: 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.shared.is_none())
            .finish()
    }
}

/// A value that may not be known yet, with the resources it depends on
pub struct DeferredValue<T> {
    shared: Arc<Shared<T>>,
    dependencies: Arc<BTreeSet<ResourceId>>,
    secret: bool,
}

impl<T> Clone for DeferredValue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            dependencies: Arc::clone(&self.dependencies),
            secret: self.secret,
        }
    }
}

impl<T> DeferredValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An already-known value with no dependencies
    pub fn of(value: T) -> Self {
        Self::from_shared(
            Shared::settled(Resolution::Known(value)),
            BTreeSet::new(),
            false,
        )
    }

    /// A value that will not be known during this run
    pub fn unknown() -> Self {
        Self::from_shared(Shared::settled(Resolution::Unknown), BTreeSet::new(), false)
    }

    pub fn failed(error: ResolutionError) -> Self {
        Self::from_shared(
            Shared::settled(Resolution::Failed(error)),
            BTreeSet::new(),
            false,
        )
    }

    /// A pending value and the resolver that settles it
    pub fn pending(dependencies: impl IntoIterator<Item = ResourceId>) -> (Self, Resolver<T>) {
        Self::pending_with(dependencies.into_iter().collect(), false)
    }

    fn pending_with(dependencies: BTreeSet<ResourceId>, secret: bool) -> (Self, Resolver<T>) {
        let shared = Arc::new(Shared::pending());
        let resolver = Resolver {
            shared: Some(Arc::clone(&shared)),
        };
        let value = Self {
            shared,
            dependencies: Arc::new(dependencies),
            secret,
        };
        (value, resolver)
    }

    fn from_shared(shared: Shared<T>, dependencies: BTreeSet<ResourceId>, secret: bool) -> Self {
        Self {
            shared: Arc::new(shared),
            dependencies: Arc::new(dependencies),
            secret,
        }
    }

    /// Resources this value was derived from
    pub fn dependencies(&self) -> &BTreeSet<ResourceId> {
        &self.dependencies
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    /// The same value, marked secret
    pub fn into_secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// The same value, additionally depending on `ids`
    pub fn with_dependencies(mut self, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        let mut dependencies = (*self.dependencies).clone();
        dependencies.extend(ids);
        self.dependencies = Arc::new(dependencies);
        self
    }

    /// Snapshot of the current state; `None` while pending
    pub fn peek(&self) -> Option<Resolution<T>> {
        self.shared.peek().map(|resolution| (*resolution).clone())
    }

    /// Wait for the value to settle without blocking the thread
    pub async fn resolution(&self) -> Resolution<T> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.subscribe(move |resolution| {
            let _ = tx.send(resolution.clone());
        });
        rx.await
            .unwrap_or(Resolution::Failed(ResolutionError::Cancelled))
    }

    /// Run `subscriber` once this value settles (immediately if it already has)
    pub fn subscribe(&self, subscriber: impl FnOnce(&Resolution<T>) + Send + 'static) {
        self.shared.subscribe(subscriber);
    }

    pub fn map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Like [`map`](Self::map), but the callback may fail the derived value
    pub fn try_map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U, ResolutionError> + Send + 'static,
    {
        let (derived, resolver) =
            DeferredValue::pending_with((*self.dependencies).clone(), self.secret);
        self.subscribe(move |resolution| match resolution {
            Resolution::Known(value) => match f(value.clone()) {
                Ok(mapped) => resolver.resolve(mapped),
                Err(error) => resolver.fail(error),
            },
            Resolution::Unknown => resolver.mark_unknown(),
            Resolution::Failed(error) => resolver.fail(error.clone()),
        });
        derived
    }

    /// Pair this value with `other`
    ///
    /// Known once both are known. If either fails the pair fails; when both
    /// fail, the failure of `self` is reported. Failure wins over unknown.
    pub fn zip<U>(&self, other: &DeferredValue<U>) -> DeferredValue<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let dependencies = self
            .dependencies
            .union(&other.dependencies)
            .cloned()
            .collect();
        let (zipped, resolver) =
            DeferredValue::pending_with(dependencies, self.secret || other.secret);

        let join = Arc::new(Mutex::new(Join {
            left: None,
            right: None,
            resolver: Some(resolver),
        }));

        let left = Arc::clone(&join);
        self.subscribe(move |resolution| {
            Join::offer(&*left, |join| join.left = Some(resolution.clone()));
        });
        other.subscribe(move |resolution| {
            Join::offer(&*join, |join| join.right = Some(resolution.clone()));
        });

        zipped
    }

    /// Collect `values` into one deferred vector, preserving order
    ///
    /// The first failure in input order is reported.
    pub fn all(values: impl IntoIterator<Item = DeferredValue<T>>) -> DeferredValue<Vec<T>> {
        let values: Vec<DeferredValue<T>> = values.into_iter().collect();
        let dependencies = values
            .iter()
            .flat_map(|value| value.dependencies.iter().cloned())
            .collect();
        let secret = values.iter().any(|value| value.secret);
        let (collected, resolver) = DeferredValue::pending_with(dependencies, secret);

        let gather = Arc::new(Mutex::new(Gather {
            slots: vec![None; values.len()],
            ready: 0,
            resolver: Some(resolver),
        }));
        Gather::offer(&*gather, |_| {});

        for (index, value) in values.iter().enumerate() {
            let gather = Arc::clone(&gather);
            value.subscribe(move |resolution| {
                Gather::offer(&*gather, |gather| {
                    if let Some(slot) = gather.slots.get_mut(index) {
                        *slot = Some(resolution.clone());
                    }
                });
            });
        }

        collected
    }
}

impl<T> From<T> for DeferredValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        DeferredValue::of(value)
    }
}

impl From<&str> for DeferredValue<String> {
    fn from(value: &str) -> Self {
        DeferredValue::of(value.to_string())
    }
}

impl<T: fmt::Debug> fmt::Debug for DeferredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DeferredValue");
        match self.shared.peek() {
            None => debug.field("state", &"pending"),
            Some(_) if self.secret => debug.field("state", &"[secret]"),
            Some(resolution) => debug.field("state", &resolution),
        };
        debug
            .field("dependencies", &self.dependencies)
            .field("secret", &self.secret)
            .finish()
    }
}

/// Rendezvous state for `zip`
struct Join<A: 'static, B: 'static> {
    left: Option<Resolution<A>>,
    right: Option<Resolution<B>>,
    resolver: Option<Resolver<(A, B)>>,
}

impl<A: Clone + 'static, B: Clone + 'static> Join<A, B> {
    fn offer(join: &Mutex<Self>, update: impl FnOnce(&mut Self)) {
        let decided = {
            let mut join = lock(join);
            update(&mut join);
            join.decide()
        };
        if let Some((resolver, resolution)) = decided {
            resolver.settle(resolution);
        }
    }

    fn decide(&mut self) -> Option<(Resolver<(A, B)>, Resolution<(A, B)>)> {
        let resolution = match (&self.left, &self.right) {
            (Some(Resolution::Failed(error)), _) => Resolution::Failed(error.clone()),
            (None, _) | (Some(_), None) => return None,
            (Some(_), Some(Resolution::Failed(error))) => Resolution::Failed(error.clone()),
            (Some(Resolution::Known(a)), Some(Resolution::Known(b))) => {
                Resolution::Known((a.clone(), b.clone()))
            }
            (Some(_), Some(_)) => Resolution::Unknown,
        };
        self.resolver.take().map(|resolver| (resolver, resolution))
    }
}

/// Rendezvous state for `all`
struct Gather<T: 'static> {
    slots: Vec<Option<Resolution<T>>>,
    /// `slots[..ready]` are settled and none of them failed
    ready: usize,
    resolver: Option<Resolver<Vec<T>>>,
}

impl<T: Clone + 'static> Gather<T> {
    fn offer(gather: &Mutex<Self>, update: impl FnOnce(&mut Self)) {
        let decided = {
            let mut gather = lock(gather);
            update(&mut gather);
            gather.decide()
        };
        if let Some((resolver, resolution)) = decided {
            resolver.settle(resolution);
        }
    }

    fn decide(&mut self) -> Option<(Resolver<Vec<T>>, Resolution<Vec<T>>)> {
        self.resolver.as_ref()?;

        while let Some(Some(resolution)) = self.slots.get(self.ready) {
            if let Resolution::Failed(error) = resolution {
                let resolution = Resolution::Failed(error.clone());
                return self.resolver.take().map(|resolver| (resolver, resolution));
            }
            self.ready += 1;
        }
        if self.ready < self.slots.len() {
            return None;
        }

        let resolution = std::mem::take(&mut self.slots)
            .into_iter()
            .map(|slot| match slot {
                Some(Resolution::Known(value)) => Some(value),
                _ => None,
            })
            .collect::<Option<Vec<T>>>()
            .map_or(Resolution::Unknown, Resolution::Known);
        self.resolver.take().map(|resolver| (resolver, resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(name: &str) -> ResourceId {
        ResourceId::new("test:Resource", name)
    }

    fn boom(name: &str) -> ResolutionError {
        ResolutionError::provider(id(name), "boom")
    }

    #[test]
    fn of_is_known_without_dependencies() {
        let value = DeferredValue::of(42);
        assert_eq!(value.peek(), Some(Resolution::Known(42)));
        assert!(value.dependencies().is_empty());
        assert!(!value.is_secret());
    }

    #[test]
    fn map_defers_until_resolved() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (source, resolver) = DeferredValue::<i32>::pending([id("a")]);

        let counter = Arc::clone(&calls);
        let doubled = source.map(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v * 2
        });

        assert_eq!(doubled.peek(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        resolver.resolve(21);

        assert_eq!(doubled.peek(), Some(Resolution::Known(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(doubled.dependencies(), source.dependencies());

        // Observing again never re-runs the callback
        assert_eq!(doubled.peek(), Some(Resolution::Known(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn map_on_settled_value_runs_immediately() {
        let value = DeferredValue::of("vpc".to_string()).map(|s| s.len());
        assert_eq!(value.peek(), Some(Resolution::Known(3)));
    }

    #[test]
    fn map_propagates_failure_without_calling() {
        let called = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&called);
        let value = DeferredValue::<i32>::failed(boom("a")).map(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v
        });

        assert_eq!(value.peek(), Some(Resolution::Failed(boom("a"))));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn map_propagates_unknown_without_calling() {
        let value = DeferredValue::<i32>::unknown().map(|_| -> i32 { panic!("not called") });
        assert_eq!(value.peek(), Some(Resolution::Unknown));
    }

    #[test]
    fn try_map_can_fail() {
        let value = DeferredValue::of(1).try_map(|_| -> Result<i32, _> {
            Err(ResolutionError::missing_output(id("state"), "vpc_id"))
        });
        assert_eq!(
            value.peek(),
            Some(Resolution::Failed(ResolutionError::missing_output(
                id("state"),
                "vpc_id"
            )))
        );
    }

    #[test]
    fn zip_waits_for_both_and_unions_dependencies() {
        let (left, resolve_left) = DeferredValue::<i32>::pending([id("a")]);
        let (right, resolve_right) = DeferredValue::<String>::pending([id("b")]);
        let pair = left.zip(&right);

        assert_eq!(
            pair.dependencies().iter().cloned().collect::<Vec<_>>(),
            vec![id("a"), id("b")]
        );

        resolve_right.resolve("x".to_string());
        assert_eq!(pair.peek(), None);

        resolve_left.resolve(1);
        assert_eq!(pair.peek(), Some(Resolution::Known((1, "x".to_string()))));
    }

    #[test]
    fn zip_fails_fast_on_first_argument() {
        let (left, resolve_left) = DeferredValue::<i32>::pending([id("a")]);
        let (right, _resolve_right) = DeferredValue::<i32>::pending([id("b")]);
        let pair = left.zip(&right);

        resolve_left.fail(boom("a"));
        assert_eq!(pair.peek(), Some(Resolution::Failed(boom("a"))));
    }

    #[test]
    fn zip_reports_first_argument_when_both_fail() {
        let (left, resolve_left) = DeferredValue::<i32>::pending([id("a")]);
        let (right, resolve_right) = DeferredValue::<i32>::pending([id("b")]);
        let pair = left.zip(&right);

        // Second fails first, but the outcome waits for the first argument
        resolve_right.fail(boom("b"));
        assert_eq!(pair.peek(), None);

        resolve_left.fail(boom("a"));
        assert_eq!(pair.peek(), Some(Resolution::Failed(boom("a"))));
    }

    #[test]
    fn zip_reports_second_failure_once_first_is_known() {
        let (right, resolve_right) = DeferredValue::<i32>::pending([id("b")]);
        let pair = DeferredValue::of(1).zip(&right);

        resolve_right.fail(boom("b"));
        assert_eq!(pair.peek(), Some(Resolution::Failed(boom("b"))));
    }

    #[test]
    fn zip_failure_wins_over_unknown() {
        let pair = DeferredValue::<i32>::unknown().zip(&DeferredValue::<i32>::failed(boom("b")));
        assert_eq!(pair.peek(), Some(Resolution::Failed(boom("b"))));

        let pair = DeferredValue::<i32>::unknown().zip(&DeferredValue::of(2));
        assert_eq!(pair.peek(), Some(Resolution::Unknown));
    }

    #[test]
    fn dropped_resolver_cancels_transitively() {
        let (source, resolver) = DeferredValue::<i32>::pending([id("a")]);
        let derived = source.map(|v| v + 1).zip(&DeferredValue::of(0));

        drop(resolver);

        assert_eq!(source.peek(), Some(Resolution::Failed(ResolutionError::Cancelled)));
        assert_eq!(
            derived.peek(),
            Some(Resolution::Failed(ResolutionError::Cancelled))
        );
    }

    #[test]
    fn secret_propagates_through_composition() {
        let secret = DeferredValue::of("hunter2".to_string()).into_secret();
        let plain = DeferredValue::of(1);

        assert!(secret.map(|s| s.len()).is_secret());
        assert!(plain.zip(&secret).is_secret());
        assert!(!plain.map(|v| v + 1).is_secret());
        assert!(DeferredValue::all([plain.map(|v| v.to_string()), secret]).is_secret());
    }

    #[test]
    fn debug_redacts_secrets() {
        let secret = DeferredValue::of("hunter2".to_string()).into_secret();
        let rendered = format!("{:?}", secret);
        assert!(rendered.contains("[secret]"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn all_collects_in_order() {
        let (first, resolve_first) = DeferredValue::<i32>::pending([id("a")]);
        let collected = DeferredValue::all([first, DeferredValue::of(2), DeferredValue::of(3)]);

        assert_eq!(collected.peek(), None);
        resolve_first.resolve(1);
        assert_eq!(collected.peek(), Some(Resolution::Known(vec![1, 2, 3])));
        assert!(collected.dependencies().contains(&id("a")));
    }

    #[test]
    fn all_of_nothing_is_empty() {
        let collected = DeferredValue::<i32>::all(Vec::new());
        assert_eq!(collected.peek(), Some(Resolution::Known(vec![])));
    }

    #[test]
    fn all_reports_first_failure_in_input_order() {
        let (first, resolve_first) = DeferredValue::<i32>::pending([id("a")]);
        let (second, resolve_second) = DeferredValue::<i32>::pending([id("b")]);
        let collected = DeferredValue::all([first, second, DeferredValue::failed(boom("c"))]);

        // A later failure waits until every earlier input has settled
        resolve_second.fail(boom("b"));
        assert_eq!(collected.peek(), None);

        resolve_first.resolve(1);
        assert_eq!(collected.peek(), Some(Resolution::Failed(boom("b"))));
    }

    #[test]
    fn all_failure_wins_over_unknown() {
        let collected = DeferredValue::all([
            DeferredValue::unknown(),
            DeferredValue::of(1),
            DeferredValue::failed(boom("a")),
        ]);
        assert_eq!(collected.peek(), Some(Resolution::Failed(boom("a"))));

        let collected = DeferredValue::all([DeferredValue::unknown(), DeferredValue::of(1)]);
        assert_eq!(collected.peek(), Some(Resolution::Unknown));
    }

    #[test]
    fn deep_map_chain_settles() {
        let (root, resolver) = DeferredValue::<u64>::pending([id("a")]);
        let mut value = root.clone();
        for _ in 0..10_000 {
            value = value.map(|v| v + 1);
        }

        resolver.resolve(0);
        assert_eq!(value.peek(), Some(Resolution::Known(10_000)));
    }

    #[test]
    fn deep_chain_cancels() {
        let (root, resolver) = DeferredValue::<u64>::pending([]);
        let mut value = root.clone();
        for _ in 0..10_000 {
            value = value.map(|v| v + 1);
        }

        drop(resolver);
        assert_eq!(
            value.peek(),
            Some(Resolution::Failed(ResolutionError::Cancelled))
        );
    }

    #[test]
    fn all_over_many_inputs_settles_when_first_is_last() {
        let (first, resolve_first) = DeferredValue::<usize>::pending([id("a")]);
        let mut resolvers = Vec::new();
        let mut values = vec![first];
        for _ in 1..10_000 {
            let (value, resolver) = DeferredValue::<usize>::pending([]);
            values.push(value);
            resolvers.push(resolver);
        }
        let collected = DeferredValue::all(values);

        for (index, resolver) in resolvers.into_iter().enumerate() {
            resolver.resolve(index + 1);
        }
        assert_eq!(collected.peek(), None);

        resolve_first.resolve(0);
        assert_eq!(
            collected.peek(),
            Some(Resolution::Known((0..10_000).collect::<Vec<_>>()))
        );
        assert!(collected.dependencies().contains(&id("a")));
    }

    #[test]
    fn with_dependencies_extends_set() {
        let value = DeferredValue::of(1).with_dependencies([id("a"), id("b")]);
        assert_eq!(value.dependencies().len(), 2);
        assert!(value.map(|v| v).dependencies().contains(&id("b")));
    }

    #[test]
    fn settles_only_once() {
        let (value, resolver) = DeferredValue::<i32>::pending([]);
        resolver.resolve(1);
        // A fresh settle on the shared state is ignored
        value.shared.settle(Resolution::Known(2));
        assert_eq!(value.peek(), Some(Resolution::Known(1)));
    }

    #[tokio::test]
    async fn resolution_awaits_settlement() {
        let (value, resolver) = DeferredValue::<String>::pending([id("a")]);
        let waiter = {
            let value = value.clone();
            tokio::spawn(async move { value.resolution().await })
        };

        tokio::task::yield_now().await;
        resolver.resolve("done".to_string());

        let resolution = waiter.await.unwrap();
        assert_eq!(resolution, Resolution::Known("done".to_string()));
        assert_eq!(resolution.into_result(), Ok(Some("done".to_string())));
    }
}
