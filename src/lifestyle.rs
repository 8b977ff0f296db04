use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::{Arc, OnceLock},
};
use tracing::debug;

use crate::{
    container::Container,
    cycle::{CycleGuard, Frame},
    errors::{RegistrationErrorKind, ResolveErrorKind},
    instance::{Instance, IntoInstance},
    plan::Resolution,
    registration::{Registration, Source},
    registry::next_id,
    types::TypeInfo,
};

/// Caching policy provided by the caller.
///
/// `key` identifies the cache of one registration, `create` runs the construction plan.
pub trait CustomLifestyle: Send + Sync + 'static {
    fn name(&self) -> &str;

    #[allow(clippy::missing_errors_doc)]
    fn get_or_create(
        &self,
        key: u64,
        create: &dyn Fn() -> Result<Instance, ResolveErrorKind>,
    ) -> Result<Instance, ResolveErrorKind>;
}

pub struct HybridLifestyle {
    selector: Arc<dyn Fn() -> bool + Send + Sync>,
    when_true: Lifestyle,
    when_false: Lifestyle,
}

/// How many instances of an implementation are created
#[derive(Clone, Default)]
pub enum Lifestyle {
    /// A new instance per request
    #[default]
    Transient,
    /// One instance per registration
    Singleton,
    /// One instance per scope, per registration outside of any scope
    Scoped,
    /// The selector, evaluated on every request, picks one of two lifestyles
    Hybrid(Arc<HybridLifestyle>),
    Custom(Arc<dyn CustomLifestyle>),
}

impl Lifestyle {
    #[must_use]
    pub fn hybrid<F>(selector: F, when_true: Lifestyle, when_false: Lifestyle) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::Hybrid(Arc::new(HybridLifestyle {
            selector: Arc::new(selector),
            when_true,
            when_false,
        }))
    }

    #[inline]
    #[must_use]
    pub fn custom(lifestyle: impl CustomLifestyle) -> Self {
        Self::Custom(Arc::new(lifestyle))
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Transient => "Transient".into(),
            Self::Singleton => "Singleton".into(),
            Self::Scoped => "Scoped".into(),
            Self::Hybrid(hybrid) => format!("Hybrid {} / {}", hybrid.when_true.name(), hybrid.when_false.name()),
            Self::Custom(custom) => custom.name().into(),
        }
    }

    /// Whether no instance is ever reused
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient => true,
            Self::Hybrid(hybrid) => hybrid.when_true.is_transient() && hybrid.when_false.is_transient(),
            Self::Singleton | Self::Scoped | Self::Custom(_) => false,
        }
    }

    /// Creates a registration of a concrete type with this lifestyle.
    /// The registration can be shared by several services with [`Container::add_registration`].
    ///
    /// # Errors
    /// - Returns [`RegistrationErrorKind::UnknownType`] if the introspector doesn't describe the type
    /// - Returns [`RegistrationErrorKind::OpenGenericImplementation`] if the type is open generic
    /// - Returns [`RegistrationErrorKind::NotConcrete`] if the type is an interface or an abstract class
    pub fn create_registration(
        &self,
        implementation_type: TypeInfo,
        container: &Container,
    ) -> Result<Arc<Registration>, RegistrationErrorKind> {
        if implementation_type.is_open() {
            return Err(RegistrationErrorKind::OpenGenericImplementation { implementation_type });
        }
        let Some(descriptor) = container.introspector().describe(&implementation_type) else {
            return Err(RegistrationErrorKind::UnknownType { ty: implementation_type });
        };
        if !descriptor.kind.is_concrete() {
            return Err(RegistrationErrorKind::NotConcrete { implementation_type });
        }

        Ok(Registration::new(implementation_type, self.clone(), Source::Constructor, container))
    }

    /// Creates a registration backed by a factory delegate, its implementation type is the service type
    #[must_use]
    pub fn create_factory_registration<F, R>(&self, service_type: TypeInfo, factory: F, container: &Container) -> Arc<Registration>
    where
        F: Fn(&Resolution) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoInstance,
    {
        let factory = Arc::new(move |resolution: &Resolution| factory(resolution).map(IntoInstance::into_instance));
        Registration::new(service_type, self.clone(), Source::Factory(factory), container)
    }

    #[must_use]
    pub(crate) fn create_cache(&self) -> InstanceCache {
        match self {
            Self::Transient => InstanceCache::None,
            Self::Singleton => InstanceCache::Singleton(OnceLock::new()),
            Self::Scoped => InstanceCache::Scoped {
                key: next_id(),
                fallback: OnceLock::new(),
            },
            Self::Hybrid(hybrid) => InstanceCache::Hybrid {
                selector: hybrid.selector.clone(),
                when_true: Box::new(hybrid.when_true.create_cache()),
                when_false: Box::new(hybrid.when_false.create_cache()),
            },
            Self::Custom(custom) => InstanceCache::Custom {
                key: next_id(),
                lifestyle: custom.clone(),
            },
        }
    }
}

impl Display for Lifestyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Debug for Lifestyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

pub(crate) type Slot = OnceLock<Result<Instance, ResolveErrorKind>>;

/// Lifestyle cache of one registration
pub(crate) enum InstanceCache {
    None,
    Singleton(Slot),
    Scoped {
        key: u64,
        fallback: Slot,
    },
    Hybrid {
        selector: Arc<dyn Fn() -> bool + Send + Sync>,
        when_true: Box<InstanceCache>,
        when_false: Box<InstanceCache>,
    },
    Custom {
        key: u64,
        lifestyle: Arc<dyn CustomLifestyle>,
    },
}

impl InstanceCache {
    pub(crate) fn get_or_create(
        &self,
        registration_id: u64,
        implementation_type: &TypeInfo,
        resolution: &Resolution,
        create: &dyn Fn() -> Result<Instance, ResolveErrorKind>,
    ) -> Result<Instance, ResolveErrorKind> {
        match self {
            Self::None => create(),
            Self::Singleton(slot) => init_slot(slot, registration_id, implementation_type, create),
            Self::Scoped { key, fallback } => match resolution.scope() {
                Some(scope) => scope.get_or_create(*key, registration_id, implementation_type, create),
                None => {
                    debug!("No active scope, cached for the container");
                    init_slot(fallback, registration_id, implementation_type, create)
                }
            },
            Self::Hybrid {
                selector,
                when_true,
                when_false,
            } => {
                let cache = if selector() { when_true } else { when_false };
                cache.get_or_create(registration_id, implementation_type, resolution, create)
            }
            Self::Custom { key, lifestyle } => lifestyle.get_or_create(*key, create),
        }
    }
}

/// Returns the cached result or creates it, at most once per slot.
///
/// Re-entering the slot from its own creation on the same thread is a cycle, it's rejected before blocking on the slot.
pub(crate) fn init_slot(
    slot: &Slot,
    registration_id: u64,
    implementation_type: &TypeInfo,
    create: &dyn Fn() -> Result<Instance, ResolveErrorKind>,
) -> Result<Instance, ResolveErrorKind> {
    if let Some(result) = slot.get() {
        debug!("Found in cache");
        return result.clone();
    }
    let _guard = CycleGuard::enter(Frame::Caching(registration_id), implementation_type)?;

    slot.get_or_init(|| {
        debug!("Not found in cache");
        let result = create();
        if result.is_ok() {
            debug!("Cached");
        }
        result
    })
    .clone()
}

#[cfg(test)]
mod tests {
    use super::{init_slot, InstanceCache, Lifestyle, Slot};
    use crate::{catalog::TypeCatalog, container::Container, errors::ResolveErrorKind, instance::Instance, plan::Resolution, types::TypeInfo};

    use std::sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc,
    };
    use tracing_test::traced_test;

    fn resolution() -> Resolution {
        Resolution::ambient(Container::new(TypeCatalog::new()))
    }

    #[test]
    #[traced_test]
    fn test_singleton_slot_replays_failure() {
        let slot = Slot::new();
        let calls = AtomicU8::new(0);
        let ty = TypeInfo::named("Failing");

        let create = || -> Result<Instance, ResolveErrorKind> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ResolveErrorKind::NullInstance { service_type: ty.clone() })
        };

        assert!(init_slot(&slot, 1, &ty, &create).is_err());
        assert!(init_slot(&slot, 1, &ty, &create).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_transient_and_singleton() {
        let resolution = resolution();
        let ty = TypeInfo::named("A");
        let create = || -> Result<Instance, ResolveErrorKind> { Ok(Instance::new(())) };

        let transient = Lifestyle::Transient.create_cache();
        let first = transient.get_or_create(1, &ty, &resolution, &create).unwrap();
        let second = transient.get_or_create(1, &ty, &resolution, &create).unwrap();
        assert!(!first.ptr_eq(&second));

        let singleton = Lifestyle::Singleton.create_cache();
        let first = singleton.get_or_create(2, &ty, &resolution, &create).unwrap();
        let second = singleton.get_or_create(2, &ty, &resolution, &create).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    #[traced_test]
    fn test_hybrid_selector_per_request() {
        let resolution = resolution();
        let ty = TypeInfo::named("A");
        let create = || -> Result<Instance, ResolveErrorKind> { Ok(Instance::new(())) };

        let flag = Arc::new(AtomicBool::new(true));
        let lifestyle = Lifestyle::hybrid(
            {
                let flag = flag.clone();
                move || flag.load(Ordering::SeqCst)
            },
            Lifestyle::Singleton,
            Lifestyle::Transient,
        );
        assert_eq!(lifestyle.name(), "Hybrid Singleton / Transient");
        assert!(!lifestyle.is_transient());

        let cache = lifestyle.create_cache();
        assert!(matches!(cache, InstanceCache::Hybrid { .. }));

        let first = cache.get_or_create(3, &ty, &resolution, &create).unwrap();
        let second = cache.get_or_create(3, &ty, &resolution, &create).unwrap();
        assert!(first.ptr_eq(&second));

        flag.store(false, Ordering::SeqCst);
        let third = cache.get_or_create(3, &ty, &resolution, &create).unwrap();
        assert!(!third.ptr_eq(&first));
    }
}
