use parking_lot::Mutex;
use std::{
    any::Any,
    cell::RefCell,
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, MutexGuard, Weak,
    },
    thread::{self, ThreadId},
};
use tracing::{debug, error, info_span, warn};

use crate::{
    container::Container,
    errors::{ResolveErrorKind, ScopeErrorKind, SharedError},
    instance::Instance,
    lifestyle::{init_slot, Slot},
    plan::{downcast, Resolution},
    registry::next_id,
    types::TypeInfo,
};

pub(crate) type EndAction = Box<dyn FnOnce() + Send>;

thread_local! {
    /// Active scopes of the current thread per container, innermost last
    static AMBIENT: RefCell<BTreeMap<u64, Vec<Arc<ScopeInner>>>> = const { RefCell::new(BTreeMap::new()) };
}

/// The innermost active scope of the current thread for the container
#[must_use]
pub(crate) fn current(container_id: u64) -> Option<Arc<ScopeInner>> {
    AMBIENT.with(|ambient| ambient.borrow().get(&container_id).and_then(|stack| stack.last().cloned()))
}

fn push(scope: Arc<ScopeInner>) {
    AMBIENT.with(|ambient| ambient.borrow_mut().entry(scope.container_id).or_default().push(scope));
}

/// Pops the stack down to and including the scope
fn pop_through(container_id: u64, scope_id: u64) {
    AMBIENT.with(|ambient| {
        let mut ambient = ambient.borrow_mut();
        let Some(stack) = ambient.get_mut(&container_id) else {
            return;
        };
        if let Some(index) = stack.iter().position(|scope| scope.id == scope_id) {
            stack.truncate(index);
        }
        if stack.is_empty() {
            ambient.remove(&container_id);
        }
    });
}

pub(crate) struct ScopeInner {
    id: u64,
    container_id: u64,
    owner: ThreadId,
    slots: Mutex<BTreeMap<u64, Arc<Slot>>>,
    disposables: Mutex<Vec<Instance>>,
    end_actions: Mutex<Vec<EndAction>>,
    parent: Option<Weak<ScopeInner>>,
    children: Mutex<Vec<Weak<ScopeInner>>>,
    ending: AtomicBool,
    disposed: AtomicBool,
}

impl ScopeInner {
    #[inline]
    #[must_use]
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn get_or_create(
        &self,
        key: u64,
        registration_id: u64,
        implementation_type: &TypeInfo,
        create: &dyn Fn() -> Result<Instance, ResolveErrorKind>,
    ) -> Result<Instance, ResolveErrorKind> {
        if self.is_disposed() {
            let err = ResolveErrorKind::ScopeDisposed {
                service_type: implementation_type.clone(),
            };
            error!("{}", err);
            return Err(err);
        }

        let slot = self.slots.lock().entry(key).or_default().clone();
        init_slot(&slot, registration_id, implementation_type, &|| -> Result<Instance, ResolveErrorKind> {
            let instance = create()?;
            if instance.is_disposable() {
                self.disposables.lock().push(instance.clone());
                debug!(scope = self.id, "Registered for disposal");
            }
            Ok(instance)
        })
    }

    pub(crate) fn register_for_disposal(&self, instance: Instance) {
        self.disposables.lock().push(instance);
    }

    pub(crate) fn when_scope_ends(&self, action: EndAction) {
        self.end_actions.lock().push(action);
    }

    fn dispose(&self) -> Result<(), ScopeErrorKind> {
        if thread::current().id() != self.owner {
            let err = ScopeErrorKind::WrongThread { scope_id: self.id };
            error!("{}", err);
            return Err(err);
        }
        if self.ending.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let span = info_span!("dispose", scope = self.id);
        let _guard = span.enter();

        let mut failures = 0;
        let mut last_error = None;

        let children = mem::take(&mut *self.children.lock());
        for child in children.iter().rev().filter_map(Weak::upgrade) {
            if let Err(err) = child.dispose() {
                match err {
                    ScopeErrorKind::Disposal { failures: count, source } => {
                        failures += count;
                        last_error = Some(source);
                    }
                    err => {
                        failures += 1;
                        last_error = Some(SharedError::new(err.into()));
                    }
                }
            }
        }

        pop_through(self.container_id, self.id);

        let actions = mem::take(&mut *self.end_actions.lock());
        debug!(count = actions.len(), "Running end actions");
        for action in actions {
            action();
        }

        self.disposed.store(true, Ordering::Release);

        let disposables = mem::take(&mut *self.disposables.lock());
        debug!(count = disposables.len(), "Disposing instances");
        for instance in disposables.iter().rev() {
            if let Err(err) = instance.dispose() {
                warn!("Disposing instance failed: {}", err);
                failures += 1;
                last_error = Some(SharedError::new(err));
            }
        }
        self.slots.lock().clear();

        match last_error {
            Some(source) => {
                let err = ScopeErrorKind::Disposal { failures, source };
                error!("{}", err);
                Err(err)
            }
            None => {
                debug!("Disposed");
                Ok(())
            }
        }
    }
}

/// A unit of caching for scoped instances.
///
/// Scopes are begun with [`Container::begin_scope`] and become the current scope of the calling thread.
/// Disposing a scope (explicitly or on drop) ends its undisposed child scopes, runs the end actions and
/// disposes the owned instances in reverse creation order. Only the thread that began the scope can end it.
///
/// A scope can be shared with other threads by reference, but it can't be moved to them,
/// so it's always dropped on the thread that began it:
///
/// ```compile_fail
/// use sinew::{Container, TypeCatalog};
///
/// let container = Container::new(TypeCatalog::new());
/// let scope = container.begin_scope();
/// std::thread::spawn(move || drop(scope));
/// ```
pub struct Scope {
    inner: Arc<ScopeInner>,
    container: Container,
    /// `Sync` but not `Send`
    _owner: PhantomData<MutexGuard<'static, ()>>,
}

impl Scope {
    #[must_use]
    pub(crate) fn begin(container: Container) -> Self {
        let parent = current(container.id());
        let inner = Arc::new(ScopeInner {
            id: next_id(),
            container_id: container.id(),
            owner: thread::current().id(),
            slots: Mutex::new(BTreeMap::new()),
            disposables: Mutex::new(Vec::new()),
            end_actions: Mutex::new(Vec::new()),
            parent: parent.as_ref().map(Arc::downgrade),
            children: Mutex::new(Vec::new()),
            ending: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });
        if let Some(parent) = parent {
            parent.children.lock().push(Arc::downgrade(&inner));
        }
        push(inner.clone());

        debug!(scope = inner.id, "Scope begun");
        Self {
            inner,
            container,
            _owner: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Id of the scope that was current when this one began
    #[must_use]
    pub fn parent_id(&self) -> Option<u64> {
        self.inner.parent.as_ref().and_then(Weak::upgrade).map(|parent| parent.id)
    }

    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Resolves the service in this scope, regardless of the current scope of the thread
    #[allow(clippy::missing_errors_doc)]
    pub fn get_instance(&self, service_type: &TypeInfo) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("get_instance", service = %service_type, scope = self.inner.id);
        let _guard = span.enter();

        self.container.lock_state();
        let result = self.resolution().get_instance(service_type);
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn get<T: Any + Send + Sync>(&self, service_type: &TypeInfo) -> Result<Arc<T>, ResolveErrorKind> {
        downcast(service_type, &self.get_instance(service_type)?)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn get_all_instances(&self, service_type: &TypeInfo) -> Result<Vec<Instance>, ResolveErrorKind> {
        let span = info_span!("get_all_instances", service = %service_type, scope = self.inner.id);
        let _guard = span.enter();

        self.container.lock_state();
        let result = self.resolution().get_all_instances(service_type);
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    /// Disposes the instance when the scope ends, after the instances created before it
    pub fn register_for_disposal(&self, instance: Instance) {
        self.inner.register_for_disposal(instance);
    }

    /// Runs the action when the scope ends, before any instance is disposed
    pub fn when_scope_ends<F: FnOnce() + Send + 'static>(&self, action: F) {
        self.inner.when_scope_ends(Box::new(action));
    }

    /// Ends the scope, a second call does nothing.
    ///
    /// # Errors
    /// - Returns [`ScopeErrorKind::WrongThread`] if called from a thread other than the one that began the scope,
    ///   the scope stays untouched then
    /// - Returns [`ScopeErrorKind::Disposal`] with the last failure if disposing any instance failed,
    ///   all the other instances are disposed anyway
    pub fn dispose(&self) -> Result<(), ScopeErrorKind> {
        self.inner.dispose()
    }

    fn resolution(&self) -> Resolution {
        Resolution::new(self.container.clone(), Some(self.inner.clone()))
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.inner.ending.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = self.inner.dispose() {
            error!("Scope disposal on drop failed: {}", err);
        }
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
