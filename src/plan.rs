use std::{
    any::{type_name, Any},
    fmt::{self, Debug, Formatter},
    sync::{Arc, Weak},
};

use crate::{
    collection::Collection,
    container::{Container, ContainerInner},
    errors::ResolveErrorKind,
    instance::Instance,
    scope::{self, ScopeInner},
    types::TypeInfo,
};

type PlanFn = dyn Fn(&Resolution) -> Result<Instance, ResolveErrorKind> + Send + Sync;

/// A construction plan: a composable function producing an instance for a resolution.
///
/// Lifestyles, decorators and the expression-built event wrap plans in other plans.
#[derive(Clone)]
pub struct Plan(Arc<PlanFn>);

impl Plan {
    #[inline]
    #[must_use]
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Resolution) -> Result<Instance, ResolveErrorKind> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Plan that always returns the same instance
    #[must_use]
    pub fn constant(instance: Instance) -> Self {
        Self::new(move |_| Ok(instance.clone()))
    }

    #[allow(clippy::missing_errors_doc)]
    #[inline]
    pub fn call(&self, resolution: &Resolution) -> Result<Instance, ResolveErrorKind> {
        (self.0)(resolution)
    }
}

impl Debug for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Plan")
    }
}

/// The context a plan runs in: the container and the scope the request belongs to
#[derive(Clone)]
pub struct Resolution {
    container: Container,
    scope: Option<Arc<ScopeInner>>,
}

impl Resolution {
    #[inline]
    #[must_use]
    pub(crate) fn new(container: Container, scope: Option<Arc<ScopeInner>>) -> Self {
        Self { container, scope }
    }

    /// Resolution in the current scope of the calling thread, if any
    #[must_use]
    pub(crate) fn ambient(container: Container) -> Self {
        let scope = scope::current(container.id());
        Self { container, scope }
    }

    #[inline]
    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    #[inline]
    #[must_use]
    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }

    #[inline]
    #[must_use]
    pub(crate) fn scope(&self) -> Option<&Arc<ScopeInner>> {
        self.scope.as_ref()
    }

    /// Resolves the service within the scope of this resolution
    #[allow(clippy::missing_errors_doc)]
    pub fn get_instance(&self, service_type: &TypeInfo) -> Result<Instance, ResolveErrorKind> {
        match self.container.lookup(service_type)? {
            Some(producer) => producer.instance(self),
            None => Err(ResolveErrorKind::NotRegistered {
                service_type: service_type.clone(),
            }),
        }
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn get<T: Any + Send + Sync>(&self, service_type: &TypeInfo) -> Result<Arc<T>, ResolveErrorKind> {
        downcast(service_type, &self.get_instance(service_type)?)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn get_all_instances(&self, service_type: &TypeInfo) -> Result<Vec<Instance>, ResolveErrorKind> {
        let collection_type = TypeInfo::enumerable(service_type.clone());
        let collection = self.get::<Collection>(&collection_type)?;
        collection.instances_for(self)
    }
}

pub(crate) fn downcast<T: Any + Send + Sync>(service_type: &TypeInfo, instance: &Instance) -> Result<Arc<T>, ResolveErrorKind> {
    instance.downcast().ok_or_else(|| ResolveErrorKind::TypeMismatch {
        service_type: service_type.clone(),
        expected: type_name::<T>(),
    })
}

/// A resolution kept by instance payloads, it doesn't keep the container or the scope alive.
///
/// Upgrades to the original scope while that scope is alive and not disposed, to the current scope of the calling
/// thread otherwise.
#[derive(Clone)]
pub(crate) struct WeakResolution {
    container: Weak<ContainerInner>,
    scope: Option<Weak<ScopeInner>>,
}

impl WeakResolution {
    #[must_use]
    pub(crate) fn new(resolution: &Resolution) -> Self {
        Self {
            container: resolution.container.downgrade(),
            scope: resolution.scope.as_ref().map(Arc::downgrade),
        }
    }

    /// Once the original scope is disposed, scoped services resolved through the upgraded resolution are cached in
    /// the current scope of the calling thread. Without a current scope they fall back to the container-wide slot
    /// of their registration and live as long as the container.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::ContainerDropped`] if the container is gone
    pub(crate) fn upgrade(&self, service_type: &TypeInfo) -> Result<Resolution, ResolveErrorKind> {
        let Some(container) = Container::upgrade(&self.container) else {
            return Err(ResolveErrorKind::ContainerDropped {
                service_type: service_type.clone(),
            });
        };

        let scope = self
            .scope
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|scope| !scope.is_disposed())
            .or_else(|| scope::current(container.id()));

        Ok(Resolution::new(container, scope))
    }
}

/// Payload of `Func<T>`: creates instances of `T` on demand
pub struct Factory {
    service_type: TypeInfo,
    plan: Plan,
    resolution: WeakResolution,
}

impl Factory {
    #[must_use]
    pub(crate) fn new(service_type: TypeInfo, plan: Plan, resolution: &Resolution) -> Self {
        Self {
            service_type,
            plan,
            resolution: WeakResolution::new(resolution),
        }
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &TypeInfo {
        &self.service_type
    }

    /// Creates an instance in the scope the factory was resolved in.
    ///
    /// After that scope is disposed, scoped dependencies come from the current scope of the calling thread.
    /// With no current scope they come from the container-wide slot, shared by every later call and never disposed.
    #[allow(clippy::missing_errors_doc)]
    pub fn create(&self) -> Result<Instance, ResolveErrorKind> {
        let resolution = self.resolution.upgrade(&self.service_type)?;
        self.plan.call(&resolution)
    }
}

impl Debug for Factory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Func<{}>", self.service_type)
    }
}

#[cfg(test)]
mod tests {
    use super::Plan;
    use crate::{catalog::TypeCatalog, container::Container, instance::Instance};

    #[test]
    fn test_constant_plan() {
        let container = Container::new(TypeCatalog::new());
        let resolution = super::Resolution::ambient(container);

        let instance = Instance::new(1_u8);
        let plan = Plan::constant(instance.clone());

        assert!(plan.call(&resolution).unwrap().ptr_eq(&instance));
        assert!(!resolution.has_scope());
    }

    #[test]
    fn test_wrapped_plan() {
        let container = Container::new(TypeCatalog::new());
        let resolution = super::Resolution::ambient(container);

        let inner = Plan::new(|_| Ok(Instance::new(2_u8)));
        let outer = {
            let inner = inner.clone();
            Plan::new(move |resolution| {
                let value = inner.call(resolution)?.downcast::<u8>().unwrap();
                Ok(Instance::new(*value * 10))
            })
        };

        assert_eq!(*outer.call(&resolution).unwrap().downcast::<u8>().unwrap(), 20);
    }
}
