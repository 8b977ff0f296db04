use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

/// An instance that needs cleanup at the end of its scope
pub trait Disposable: Send + Sync + 'static {
    #[allow(clippy::missing_errors_doc)]
    fn dispose(&self) -> anyhow::Result<()>;
}

type Disposer = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A type-erased, shared instance produced by the container.
///
/// Cloning is cheap and keeps the identity, see [`Instance::ptr_eq`].
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    disposer: Option<Disposer>,
}

impl Instance {
    #[inline]
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    #[inline]
    #[must_use]
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self { value, disposer: None }
    }

    /// Creates an instance that a scope disposes when it ends
    #[must_use]
    pub fn disposable<T: Disposable>(value: T) -> Self {
        let value = Arc::new(value);
        let target = value.clone();
        Self {
            value,
            disposer: Some(Arc::new(move || target.dispose())),
        }
    }

    #[inline]
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast().ok()
    }

    #[inline]
    #[must_use]
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    #[inline]
    #[must_use]
    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Whether both instances point to the same value
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::as_ptr(&self.value).cast::<()>() == Arc::as_ptr(&other.value).cast::<()>()
    }

    #[inline]
    #[must_use]
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    pub(crate) fn dispose(&self) -> anyhow::Result<()> {
        match &self.disposer {
            Some(disposer) => disposer(),
            None => Ok(()),
        }
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("ptr", &Arc::as_ptr(&self.value).cast::<()>())
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

/// Result of a factory delegate, `None` is reported as a missing instance
pub trait IntoInstance {
    fn into_instance(self) -> Option<Instance>;
}

impl IntoInstance for Instance {
    #[inline]
    fn into_instance(self) -> Option<Instance> {
        Some(self)
    }
}

impl IntoInstance for Option<Instance> {
    #[inline]
    fn into_instance(self) -> Option<Instance> {
        self
    }
}
