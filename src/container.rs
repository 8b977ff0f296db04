use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::{
    any::Any,
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock, Weak},
};
use tracing::{debug, error, info_span, warn};

use crate::{
    collection::{collection_builder, CollectionSource},
    config::ContainerOptions,
    cycle::{CycleGuard, Frame},
    decorator::{validate_decorator, DecoratorPredicate, DecoratorPredicateContext, DecoratorRule, DecoratorTarget},
    errors::{RegistrationErrorKind, ResolveErrorKind, ScopeErrorKind},
    events::{
        self, ExpressionBuildingEventArgs, ExpressionBuiltEventArgs, InstanceCreatedEventArgs, UnregisteredTypeEventArgs,
    },
    generics::{close_implementation, unify, validate_open_generic, OpenGenericPredicate, OpenGenericPredicateContext},
    instance::{Instance, IntoInstance},
    introspector::{closed_bases, is_assignable, TypeIntrospector, TypeKind},
    lifestyle::Lifestyle,
    plan::{downcast, Factory, Plan, Resolution},
    producer::InstanceProducer,
    registration::{KnownRelationship, PlanBuilder, Registration, RegistrationKind, Source},
    registry::{next_id, ContainerState, OpenGenericRegistration, Registry},
    scope::{self, Scope},
    types::{Bindings, TypeInfo},
};

type Lookup = Result<Option<Arc<InstanceProducer>>, ResolveErrorKind>;

pub(crate) struct ContainerInner {
    id: u64,
    introspector: Arc<dyn TypeIntrospector>,
    registry: RwLock<Registry>,
    /// Snapshot of the registry taken when the container got locked
    frozen: OnceLock<Arc<Registry>>,
    /// Lookups of types without an explicit registration, failures included
    resolved: Mutex<BTreeMap<TypeInfo, Lookup>>,
    /// Producers created by lookups, in creation order
    created: Mutex<Vec<Arc<InstanceProducer>>>,
    build_lock: ReentrantMutex<()>,
}

/// The container: a registration table that becomes read-only on the first resolution.
///
/// Cloning is cheap, clones share the registrations, the singletons and the scopes.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Creates a container with the default options
    #[inline]
    #[must_use]
    pub fn new(introspector: impl TypeIntrospector) -> Self {
        Self::with_options(introspector, ContainerOptions::default())
    }

    #[must_use]
    pub fn with_options(introspector: impl TypeIntrospector, options: ContainerOptions) -> Self {
        let id = next_id();
        debug!(container = id, "Container created");
        Self {
            inner: Arc::new(ContainerInner {
                id,
                introspector: Arc::new(introspector),
                registry: RwLock::new(Registry::new(options)),
                frozen: OnceLock::new(),
                resolved: Mutex::new(BTreeMap::new()),
                created: Mutex::new(Vec::new()),
                build_lock: ReentrantMutex::new(()),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    #[must_use]
    pub fn introspector(&self) -> &dyn TypeIntrospector {
        &*self.inner.introspector
    }

    #[must_use]
    pub fn state(&self) -> ContainerState {
        match self.inner.frozen.get() {
            Some(_) => ContainerState::Locked,
            None => ContainerState::Mutable,
        }
    }

    /// Whether the first resolution already happened
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state() == ContainerState::Locked
    }

    #[must_use]
    pub fn options(&self) -> ContainerOptions {
        self.inner.registry.read().options.clone()
    }

    #[inline]
    #[must_use]
    pub(crate) fn downgrade(&self) -> Weak<ContainerInner> {
        Arc::downgrade(&self.inner)
    }

    #[inline]
    #[must_use]
    pub(crate) fn upgrade(inner: &Weak<ContainerInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Serializes plan building, reentrant on the same thread
    #[inline]
    pub(crate) fn build_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.build_lock.lock()
    }

    /// Locks the container and returns the registry snapshot
    pub(crate) fn frozen(&self) -> Arc<Registry> {
        self.inner
            .frozen
            .get_or_init(|| {
                let mut registry = self.inner.registry.write();
                registry.state = ContainerState::Locked;
                debug!(container = self.inner.id, "Container locked");
                Arc::new(registry.clone())
            })
            .clone()
    }

    #[inline]
    pub(crate) fn lock_state(&self) {
        self.frozen();
    }

    #[must_use]
    pub(crate) fn decorators(&self) -> Vec<Arc<DecoratorRule>> {
        self.frozen().decorators.clone()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Registry) -> Result<R, RegistrationErrorKind>) -> Result<R, RegistrationErrorKind> {
        let mut registry = self.inner.registry.write();
        let result = registry.ensure_mutable().and_then(|()| f(&mut registry));
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    fn ensure_mutable(&self) -> Result<(), RegistrationErrorKind> {
        let result = self.inner.registry.read().ensure_mutable();
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    /// Changes the options
    ///
    /// # Errors
    /// Returns [`RegistrationErrorKind::Locked`] if the container is locked
    pub fn configure<F: FnOnce(&mut ContainerOptions)>(&self, f: F) -> Result<(), RegistrationErrorKind> {
        self.mutate(|registry| {
            f(&mut registry.options);
            Ok(())
        })
    }
}

impl Container {
    /// Registers the implementation for the service with the default lifestyle
    #[allow(clippy::missing_errors_doc)]
    pub fn register(&self, service_type: TypeInfo, implementation_type: TypeInfo) -> Result<(), RegistrationErrorKind> {
        let lifestyle = self.options().default_lifestyle;
        self.register_with(service_type, implementation_type, lifestyle)
    }

    /// Registers the implementation for the service.
    ///
    /// # Errors
    /// - Returns [`RegistrationErrorKind::Locked`] if the container is locked
    /// - Returns [`RegistrationErrorKind::OpenGenericService`] if the service is open generic
    /// - Returns [`RegistrationErrorKind::OpenGenericImplementation`], [`RegistrationErrorKind::UnknownType`] or
    ///   [`RegistrationErrorKind::NotConcrete`] if the implementation can't be created
    /// - Returns [`RegistrationErrorKind::NotAssignable`] if the implementation doesn't implement the service
    /// - Returns [`RegistrationErrorKind::AlreadyRegistered`] if the service is registered and overriding is disabled
    pub fn register_with(
        &self,
        service_type: TypeInfo,
        implementation_type: TypeInfo,
        lifestyle: Lifestyle,
    ) -> Result<(), RegistrationErrorKind> {
        let span = info_span!("register", service = %service_type, implementation = %implementation_type);
        let _guard = span.enter();

        self.ensure_mutable()?;
        let registration = lifestyle.create_registration(implementation_type, self).map_err(|err| {
            error!("{}", err);
            err
        })?;
        self.add_registration(service_type, registration)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn register_singleton(&self, service_type: TypeInfo, implementation_type: TypeInfo) -> Result<(), RegistrationErrorKind> {
        self.register_with(service_type, implementation_type, Lifestyle::Singleton)
    }

    /// Registers a factory delegate for the service.
    /// The delegate may return `None`, which fails the resolution with [`ResolveErrorKind::NullInstance`].
    #[allow(clippy::missing_errors_doc)]
    pub fn register_factory<F, R>(&self, service_type: TypeInfo, lifestyle: Lifestyle, factory: F) -> Result<(), RegistrationErrorKind>
    where
        F: Fn(&Resolution) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoInstance,
    {
        self.ensure_mutable()?;
        let registration = lifestyle.create_factory_registration(service_type.clone(), factory, self);
        self.add_registration(service_type, registration)
    }

    /// Registers an existing instance, returned on every request
    #[allow(clippy::missing_errors_doc)]
    pub fn register_instance(&self, service_type: TypeInfo, instance: Instance) -> Result<(), RegistrationErrorKind> {
        self.ensure_mutable()?;
        let registration = Registration::new(service_type.clone(), Lifestyle::Singleton, Source::Instance(instance), self);
        self.add_registration(service_type, registration)
    }

    /// Registers the service with an existing registration, several services sharing a registration share its instances
    #[allow(clippy::missing_errors_doc)]
    pub fn add_registration(&self, service_type: TypeInfo, registration: Arc<Registration>) -> Result<(), RegistrationErrorKind> {
        if service_type.is_open() {
            let err = RegistrationErrorKind::OpenGenericService { service_type };
            error!("{}", err);
            return Err(err);
        }
        if registration.kind() == RegistrationKind::Constructor
            && !is_assignable(self.introspector(), &service_type, registration.implementation_type())
        {
            let err = RegistrationErrorKind::NotAssignable {
                service_type,
                implementation_type: registration.implementation_type().clone(),
            };
            error!("{}", err);
            return Err(err);
        }

        debug!(service = %service_type, implementation = %registration.implementation_type(), lifestyle = %registration.lifestyle(), "Registered");
        let producer = InstanceProducer::new(service_type, registration, self);
        self.mutate(|registry| registry.add_producer(producer))
    }

    /// Registers a collection of the service whose elements are resolved through the container.
    ///
    /// Elements may be open generic, they are closed for each requested collection and skipped when they don't fit.
    #[allow(clippy::missing_errors_doc)]
    pub fn register_collection(
        &self,
        service_type: TypeInfo,
        implementation_types: impl IntoIterator<Item = TypeInfo>,
    ) -> Result<(), RegistrationErrorKind> {
        let span = info_span!("register_collection", service = %service_type);
        let _guard = span.enter();

        self.ensure_mutable()?;
        let implementation_types = implementation_types.into_iter().collect::<Vec<_>>();
        for implementation_type in &implementation_types {
            self.validate_element(&service_type, implementation_type).map_err(|err| {
                error!("{}", err);
                err
            })?;
        }

        debug!(count = implementation_types.len(), "Collection registered");
        self.add_collection(service_type, CollectionSource::Controlled(implementation_types))
    }

    /// Registers a collection whose elements are produced by the caller, `source` is called on every iteration
    #[allow(clippy::missing_errors_doc)]
    pub fn register_collection_source<F>(&self, service_type: TypeInfo, source: F) -> Result<(), RegistrationErrorKind>
    where
        F: Fn() -> Vec<Instance> + Send + Sync + 'static,
    {
        let span = info_span!("register_collection_source", service = %service_type);
        let _guard = span.enter();

        self.ensure_mutable()?;
        debug!("Collection source registered");
        self.add_collection(service_type, CollectionSource::Uncontrolled(Arc::new(source)))
    }

    fn validate_element(&self, service_type: &TypeInfo, implementation_type: &TypeInfo) -> Result<(), RegistrationErrorKind> {
        let introspector = self.introspector();
        let Some(descriptor) = introspector.describe(implementation_type) else {
            return Err(RegistrationErrorKind::UnknownType {
                ty: implementation_type.clone(),
            });
        };
        if !descriptor.kind.is_concrete() {
            return Err(RegistrationErrorKind::NotConcrete {
                implementation_type: implementation_type.clone(),
            });
        }

        let assignable = if service_type.is_open() || implementation_type.is_open() {
            implementation_type.same_definition(service_type)
                || closed_bases(introspector, implementation_type)
                    .iter()
                    .any(|base| base.same_definition(service_type))
        } else {
            is_assignable(introspector, service_type, implementation_type)
        };
        if !assignable {
            return Err(RegistrationErrorKind::NotAssignable {
                service_type: service_type.clone(),
                implementation_type: implementation_type.clone(),
            });
        }
        Ok(())
    }

    fn add_collection(&self, service_type: TypeInfo, source: CollectionSource) -> Result<(), RegistrationErrorKind> {
        self.mutate(|registry| {
            if registry.collections.contains_key(&service_type) && !registry.options.allow_overriding_registrations {
                return Err(RegistrationErrorKind::AlreadyRegistered {
                    service_type: TypeInfo::enumerable(service_type),
                });
            }
            registry.collections.insert(service_type, source);
            Ok(())
        })
    }

    /// Registers an open generic implementation for an open generic service, used for every closed request it fits
    #[allow(clippy::missing_errors_doc)]
    pub fn register_open_generic(
        &self,
        service_type: TypeInfo,
        implementation_type: TypeInfo,
        lifestyle: Lifestyle,
    ) -> Result<(), RegistrationErrorKind> {
        self.add_open_generic(service_type, implementation_type, lifestyle, None)
    }

    /// Registers an open generic implementation used only for the requests the predicate accepts.
    ///
    /// # Errors
    /// - Returns [`RegistrationErrorKind::NotOpenGeneric`] if the service or the implementation isn't open generic
    /// - Returns [`RegistrationErrorKind::NotAssignable`] if the implementation doesn't implement the service definition
    /// - Returns [`RegistrationErrorKind::UnresolvableTypeArguments`] if a type parameter of the implementation
    ///   can't be determined from the service
    pub fn register_open_generic_when<P>(
        &self,
        service_type: TypeInfo,
        implementation_type: TypeInfo,
        lifestyle: Lifestyle,
        predicate: P,
    ) -> Result<(), RegistrationErrorKind>
    where
        P: Fn(&OpenGenericPredicateContext) -> bool + Send + Sync + 'static,
    {
        self.add_open_generic(service_type, implementation_type, lifestyle, Some(Arc::new(predicate)))
    }

    fn add_open_generic(
        &self,
        service_type: TypeInfo,
        implementation_type: TypeInfo,
        lifestyle: Lifestyle,
        predicate: Option<OpenGenericPredicate>,
    ) -> Result<(), RegistrationErrorKind> {
        let span = info_span!("register_open_generic", service = %service_type, implementation = %implementation_type);
        let _guard = span.enter();

        self.ensure_mutable()?;
        validate_open_generic(self.introspector(), &service_type, &implementation_type).map_err(|err| {
            error!("{}", err);
            err
        })?;

        self.mutate(|registry| {
            registry.open_generics.push(OpenGenericRegistration {
                service_type,
                implementation_type,
                lifestyle,
                predicate,
            });
            Ok(())
        })
    }

    /// Registers a transient decorator for the service
    #[allow(clippy::missing_errors_doc)]
    pub fn register_decorator(&self, service_type: TypeInfo, decorator_type: TypeInfo) -> Result<(), RegistrationErrorKind> {
        self.register_decorator_with(service_type, decorator_type, Lifestyle::Transient)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn register_decorator_with(
        &self,
        service_type: TypeInfo,
        decorator_type: TypeInfo,
        lifestyle: Lifestyle,
    ) -> Result<(), RegistrationErrorKind> {
        self.add_decorator(service_type, decorator_type, lifestyle, None)
    }

    /// Registers a decorator applied where the predicate accepts the context.
    ///
    /// Decorators wrap each other in registration order, the first registered is the innermost.
    ///
    /// # Errors
    /// - Returns [`RegistrationErrorKind::InvalidDecorator`] if the decorator hasn't exactly one public constructor
    ///   with exactly one parameter of the service type or of `Func` of it
    /// - Returns [`RegistrationErrorKind::NotAssignable`] if the decorator doesn't implement the service
    pub fn register_decorator_when<P>(
        &self,
        service_type: TypeInfo,
        decorator_type: TypeInfo,
        lifestyle: Lifestyle,
        predicate: P,
    ) -> Result<(), RegistrationErrorKind>
    where
        P: Fn(&DecoratorPredicateContext) -> bool + Send + Sync + 'static,
    {
        self.add_decorator(service_type, decorator_type, lifestyle, Some(Arc::new(predicate)))
    }

    fn add_decorator(
        &self,
        service_type: TypeInfo,
        decorator_type: TypeInfo,
        lifestyle: Lifestyle,
        predicate: Option<DecoratorPredicate>,
    ) -> Result<(), RegistrationErrorKind> {
        let span = info_span!("register_decorator", service = %service_type, decorator = %decorator_type);
        let _guard = span.enter();

        self.ensure_mutable()?;
        let validated = if service_type.is_open() && !decorator_type.is_open() {
            Err(RegistrationErrorKind::NotOpenGeneric { ty: decorator_type.clone() })
        } else {
            validate_decorator(self.introspector(), &service_type, &decorator_type)
        };
        validated.map_err(|err| {
            error!("{}", err);
            err
        })?;

        let rule = DecoratorRule::new(service_type, DecoratorTarget::Type(decorator_type), lifestyle, predicate);
        self.mutate(|registry| {
            registry.decorators.push(Arc::new(rule));
            Ok(())
        })
    }

    /// Registers a decorator whose type is picked per decoration point by `type_factory`.
    /// The picked type is validated when it's applied.
    #[allow(clippy::missing_errors_doc)]
    pub fn register_decorator_factory<F, P>(
        &self,
        service_type: TypeInfo,
        type_factory: F,
        lifestyle: Lifestyle,
        predicate: P,
    ) -> Result<(), RegistrationErrorKind>
    where
        F: Fn(&DecoratorPredicateContext) -> TypeInfo + Send + Sync + 'static,
        P: Fn(&DecoratorPredicateContext) -> bool + Send + Sync + 'static,
    {
        let rule = DecoratorRule::new(
            service_type,
            DecoratorTarget::Factory(Arc::new(type_factory)),
            lifestyle,
            Some(Arc::new(predicate)),
        );
        self.mutate(|registry| {
            registry.decorators.push(Arc::new(rule));
            Ok(())
        })
    }
}

impl Container {
    /// Subscribes a handler called for every requested type without a registration.
    /// The handlers are called once per type, in subscription order.
    #[allow(clippy::missing_errors_doc)]
    pub fn on_unregistered_type<F>(&self, handler: F) -> Result<(), RegistrationErrorKind>
    where
        F: Fn(&mut UnregisteredTypeEventArgs) + Send + Sync + 'static,
    {
        self.mutate(|registry| {
            registry.unregistered_type_handlers.push(Arc::new(handler));
            Ok(())
        })
    }

    /// Subscribes a handler called once per registration when its plan is built, before the lifestyle is applied
    #[allow(clippy::missing_errors_doc)]
    pub fn on_expression_building<F>(&self, handler: F) -> Result<(), RegistrationErrorKind>
    where
        F: Fn(&mut ExpressionBuildingEventArgs) + Send + Sync + 'static,
    {
        self.mutate(|registry| {
            registry.expression_building_handlers.push(Arc::new(handler));
            Ok(())
        })
    }

    /// Subscribes a handler called once per service when its final plan is built
    #[allow(clippy::missing_errors_doc)]
    pub fn on_expression_built<F>(&self, handler: F) -> Result<(), RegistrationErrorKind>
    where
        F: Fn(&mut ExpressionBuiltEventArgs) + Send + Sync + 'static,
    {
        self.mutate(|registry| {
            registry.expression_built_handlers.push(Arc::new(handler));
            Ok(())
        })
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn on_instance_created<F>(&self, handler: F) -> Result<(), RegistrationErrorKind>
    where
        F: Fn(&InstanceCreatedEventArgs<'_>) + Send + Sync + 'static,
    {
        self.mutate(|registry| {
            registry.instance_created_handlers.push(Arc::new(handler));
            Ok(())
        })
    }
}

impl Container {
    /// Resolves the service in the current scope of the calling thread, locks the container
    #[allow(clippy::missing_errors_doc)]
    pub fn get_instance(&self, service_type: &TypeInfo) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("get_instance", service = %service_type);
        let _guard = span.enter();

        self.lock_state();
        let result = Resolution::ambient(self.clone()).get_instance(service_type);
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn get<T: Any + Send + Sync>(&self, service_type: &TypeInfo) -> Result<Arc<T>, ResolveErrorKind> {
        downcast(service_type, &self.get_instance(service_type)?)
    }

    /// Resolves the elements of the collection of the service, an unregistered collection is empty
    #[allow(clippy::missing_errors_doc)]
    pub fn get_all_instances(&self, service_type: &TypeInfo) -> Result<Vec<Instance>, ResolveErrorKind> {
        let span = info_span!("get_all_instances", service = %service_type);
        let _guard = span.enter();

        self.lock_state();
        let result = Resolution::ambient(self.clone()).get_all_instances(service_type);
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    /// Returns the producer of the service, `None` if the service can't be resolved at all.
    ///
    /// # Errors
    /// Returns the lookup failure, such as an ambiguous open generic or unregistered type resolution
    pub fn get_registration(&self, service_type: &TypeInfo) -> Result<Option<Arc<InstanceProducer>>, ResolveErrorKind> {
        let span = info_span!("get_registration", service = %service_type);
        let _guard = span.enter();

        self.lock_state();
        self.lookup(service_type)
    }

    /// Explicit registrations in registration order, followed by the producers created by lookups so far
    #[must_use]
    pub fn get_current_registrations(&self) -> Vec<Arc<InstanceProducer>> {
        let mut producers = match self.inner.frozen.get() {
            Some(registry) => registry.ordered_producers(),
            None => self.inner.registry.read().ordered_producers(),
        };
        producers.extend(self.inner.created.lock().iter().cloned());
        producers
    }

    /// Locks the container, then builds and resolves every registration and iterates every collection
    /// in a scope ended afterwards.
    ///
    /// # Errors
    /// Returns the first failure as [`ResolveErrorKind::Verification`]
    pub fn verify(&self) -> Result<(), ResolveErrorKind> {
        let span = info_span!("verify", container = self.inner.id);
        let _guard = span.enter();

        let registry = self.frozen();
        let scope = self.begin_scope();

        let verification = |service_type: &TypeInfo, err: ResolveErrorKind| {
            let err = ResolveErrorKind::Verification {
                service_type: service_type.clone(),
                source: Box::new(err),
            };
            error!("{}", err);
            err
        };

        for producer in registry.ordered_producers() {
            debug!(service = %producer.service_type(), "Verifying");
            producer
                .build_plan()
                .and_then(|_| scope.get_instance(producer.service_type()))
                .map_err(|err| verification(producer.service_type(), err))?;
        }
        for service_type in registry.collections.keys().filter(|ty| !ty.is_open()) {
            debug!(service = %service_type, "Verifying collection");
            scope
                .get_all_instances(service_type)
                .map_err(|err| verification(service_type, err))?;
        }

        if let Err(err) = scope.dispose() {
            warn!("Ending the verification scope failed: {}", err);
        }
        debug!("Verified");
        Ok(())
    }
}

impl Container {
    /// Begins a scope, it becomes the current scope of the calling thread until it's disposed
    #[must_use]
    pub fn begin_scope(&self) -> Scope {
        Scope::begin(self.clone())
    }

    /// Disposes the instance when the current scope ends
    ///
    /// # Errors
    /// Returns [`ScopeErrorKind::NoActiveScope`] if the calling thread has no current scope
    pub fn register_for_disposal(&self, instance: Instance) -> Result<(), ScopeErrorKind> {
        let Some(scope) = scope::current(self.inner.id) else {
            let err = ScopeErrorKind::NoActiveScope;
            error!("{}", err);
            return Err(err);
        };
        scope.register_for_disposal(instance);
        Ok(())
    }

    /// Runs the action when the current scope ends
    ///
    /// # Errors
    /// Returns [`ScopeErrorKind::NoActiveScope`] if the calling thread has no current scope
    pub fn when_scope_ends<F: FnOnce() + Send + 'static>(&self, action: F) -> Result<(), ScopeErrorKind> {
        let Some(scope) = scope::current(self.inner.id) else {
            let err = ScopeErrorKind::NoActiveScope;
            error!("{}", err);
            return Err(err);
        };
        scope.when_scope_ends(Box::new(action));
        Ok(())
    }
}

impl Container {
    /// Finds the producer of the service: explicit registration, built-in collection and `Func` producers,
    /// open generics, unregistered type handlers, then automatic creation of concrete classes
    pub(crate) fn lookup(&self, service_type: &TypeInfo) -> Lookup {
        let registry = self.frozen();
        if let Some(producer) = registry.producers.get(service_type) {
            return Ok(Some(producer.clone()));
        }
        if let Some(result) = self.inner.resolved.lock().get(service_type) {
            debug!(service = %service_type, "Found in cache");
            return result.clone();
        }

        let _lock = self.build_lock();
        if let Some(result) = self.inner.resolved.lock().get(service_type) {
            return result.clone();
        }

        let _frame = CycleGuard::enter(Frame::Lookup(service_type.clone()), service_type)?;
        let result = self.resolve_unregistered(&registry, service_type);
        match &result {
            Ok(Some(producer)) => {
                debug!(service = %service_type, implementation = %producer.implementation_type(), "Producer created");
                self.inner.created.lock().push(producer.clone());
            }
            Ok(None) => warn!(service = %service_type, "No registration found"),
            Err(err) => error!("{}", err),
        }
        self.inner.resolved.lock().insert(service_type.clone(), result.clone());
        result
    }

    fn resolve_unregistered(&self, registry: &Registry, service_type: &TypeInfo) -> Lookup {
        if service_type.is_open() {
            return Ok(None);
        }

        if let Some(element_type) = service_type.enumerable_element() {
            let source = find_collection(registry, element_type);
            let builder = collection_builder(element_type.clone(), source);
            return Ok(Some(self.builtin_producer(service_type, Source::Collection(builder))));
        }
        if let Some(product_type) = service_type.func_product() {
            let builder = func_builder(product_type.clone());
            return Ok(Some(self.builtin_producer(service_type, Source::Func(builder))));
        }

        if let Some(registration) = self.open_generic(registry, service_type)? {
            return Ok(Some(InstanceProducer::new(service_type.clone(), registration, self)));
        }
        if let Some(registration) = events::unregistered_type(self, service_type)? {
            return Ok(Some(InstanceProducer::new(service_type.clone(), registration, self)));
        }

        if !registry.options.resolve_unregistered_concrete_types {
            return Ok(None);
        }
        let Some(descriptor) = self.introspector().describe(service_type) else {
            return Ok(None);
        };
        if descriptor.kind != TypeKind::Class || descriptor.constructors.is_empty() {
            debug!(service = %service_type, kind = ?descriptor.kind, "Not created automatically");
            return Ok(None);
        }
        let registration = registry
            .options
            .default_lifestyle
            .create_registration(service_type.clone(), self)?;
        Ok(Some(InstanceProducer::new(service_type.clone(), registration, self)))
    }

    fn builtin_producer(&self, service_type: &TypeInfo, source: Source) -> Arc<InstanceProducer> {
        let registration = Registration::new(service_type.clone(), Lifestyle::Transient, source, self);
        InstanceProducer::new(service_type.clone(), registration, self)
    }

    /// Picks the open generic registration accepting the request, in registration order
    fn open_generic(&self, registry: &Registry, service_type: &TypeInfo) -> Result<Option<Arc<Registration>>, ResolveErrorKind> {
        let mut accepted: Option<(TypeInfo, &OpenGenericRegistration)> = None;

        for candidate in &registry.open_generics {
            if !unify(&candidate.service_type, service_type, &mut Bindings::new()) {
                continue;
            }
            let Some(implementation_type) = close_implementation(self.introspector(), service_type, &candidate.implementation_type)
            else {
                continue;
            };

            let context = OpenGenericPredicateContext {
                service_type: service_type.clone(),
                implementation_type,
                handled: accepted.is_some(),
            };
            let accepts = match &candidate.predicate {
                Some(predicate) => predicate(&context),
                None => !context.handled,
            };
            if !accepts {
                debug!(implementation = %context.implementation_type, "Open generic registration skipped");
                continue;
            }

            if let Some((first, _)) = accepted {
                return Err(ResolveErrorKind::AmbiguousOpenGeneric {
                    service_type: service_type.clone(),
                    first,
                    second: context.implementation_type,
                });
            }
            accepted = Some((context.implementation_type, candidate));
        }

        let Some((implementation_type, candidate)) = accepted else {
            return Ok(None);
        };
        debug!(service = %service_type, implementation = %implementation_type, "Open generic closed");
        Ok(Some(candidate.lifestyle.create_registration(implementation_type, self)?))
    }
}

impl Debug for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// The collection registered for the element type, by exact type first, then by open generic service
fn find_collection(registry: &Registry, element_type: &TypeInfo) -> Option<CollectionSource> {
    if let Some(source) = registry.collections.get(element_type) {
        return Some(source.clone());
    }
    registry
        .collections
        .iter()
        .find(|(service_type, _)| service_type.is_open() && unify(service_type, element_type, &mut Bindings::new()))
        .map(|(_, source)| source.clone())
}

/// Builds the plan of `Func<product_type>`: each request gets a new [`Factory`], the product is created on demand
fn func_builder(product_type: TypeInfo) -> PlanBuilder {
    Arc::new(move |container: &Container| -> Result<(Plan, Vec<KnownRelationship>), ResolveErrorKind> {
        let Some(producer) = container.lookup(&product_type)? else {
            return Err(ResolveErrorKind::NotRegistered {
                service_type: product_type.clone(),
            });
        };
        let relationship = KnownRelationship {
            implementation_type: TypeInfo::func(product_type.clone()),
            lifestyle: Lifestyle::Transient,
            dependency: producer.clone(),
        };

        let product = Plan::new(move |resolution| producer.instance(resolution));
        let product_type = product_type.clone();
        let plan = Plan::new(move |resolution| Ok(Instance::new(Factory::new(product_type.clone(), product.clone(), resolution))));
        Ok((plan, vec![relationship]))
    })
}
