use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};
use tracing::debug;

use crate::{
    container::Container,
    errors::ResolveErrorKind,
    instance::{Instance, IntoInstance},
    lifestyle::Lifestyle,
    plan::{Plan, Resolution},
    producer::InstanceProducer,
    registration::{KnownRelationship, Registration},
    types::TypeInfo,
};

pub type UnregisteredTypeHandler = Arc<dyn Fn(&mut UnregisteredTypeEventArgs) + Send + Sync>;
pub type ExpressionBuildingHandler = Arc<dyn Fn(&mut ExpressionBuildingEventArgs) + Send + Sync>;
pub type ExpressionBuiltHandler = Arc<dyn Fn(&mut ExpressionBuiltEventArgs) + Send + Sync>;
pub type InstanceCreatedHandler = Arc<dyn Fn(&InstanceCreatedEventArgs<'_>) + Send + Sync>;

/// Raised once per requested type that has no registration, before the type is created automatically.
///
/// A handler resolves the type by calling [`UnregisteredTypeEventArgs::register`]. Registrations of
/// several handlers for the same type are an error.
pub struct UnregisteredTypeEventArgs {
    service_type: TypeInfo,
    container: Container,
    registrations: Vec<Arc<Registration>>,
}

impl UnregisteredTypeEventArgs {
    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &TypeInfo {
        &self.service_type
    }

    /// The container, to create registrations with [`Lifestyle::create_registration`]
    #[inline]
    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Whether a handler has already registered something for the type
    #[inline]
    #[must_use]
    pub fn handled(&self) -> bool {
        !self.registrations.is_empty()
    }

    pub fn register(&mut self, registration: Arc<Registration>) {
        debug!(service = %self.service_type, implementation = %registration.implementation_type(), "Unregistered type handled");
        self.registrations.push(registration);
    }

    /// Registers a factory delegate for the type
    pub fn register_factory<F, R>(&mut self, lifestyle: Lifestyle, factory: F)
    where
        F: Fn(&Resolution) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoInstance,
    {
        let registration = lifestyle.create_factory_registration(self.service_type.clone(), factory, &self.container);
        self.register(registration);
    }
}

impl Debug for UnregisteredTypeEventArgs {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnregisteredTypeEventArgs")
            .field("service_type", &self.service_type)
            .field("handled", &self.handled())
            .finish_non_exhaustive()
    }
}

/// Raised once per registration after its plan is built, before lifestyle caching is applied
pub struct ExpressionBuildingEventArgs {
    implementation_type: TypeInfo,
    lifestyle: Lifestyle,
    plan: Plan,
    relationships: Vec<KnownRelationship>,
}

impl ExpressionBuildingEventArgs {
    #[inline]
    #[must_use]
    pub fn implementation_type(&self) -> &TypeInfo {
        &self.implementation_type
    }

    #[inline]
    #[must_use]
    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    #[inline]
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Replaces the plan, the replacement usually wraps [`Self::plan`]
    #[inline]
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = plan;
    }

    /// Adds a dependency the replaced plan introduces
    pub fn add_relationship(&mut self, relationship: KnownRelationship) {
        self.relationships.push(relationship);
    }
}

/// Raised once per service after lifestyle caching and decorators are applied
pub struct ExpressionBuiltEventArgs {
    service_type: TypeInfo,
    implementation_type: TypeInfo,
    lifestyle: Lifestyle,
    plan: Plan,
}

impl ExpressionBuiltEventArgs {
    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &TypeInfo {
        &self.service_type
    }

    #[inline]
    #[must_use]
    pub fn implementation_type(&self) -> &TypeInfo {
        &self.implementation_type
    }

    #[inline]
    #[must_use]
    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    #[inline]
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    #[inline]
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = plan;
    }
}

/// Raised every time an activator or a factory delegate produced an instance
#[derive(Debug)]
pub struct InstanceCreatedEventArgs<'a> {
    pub implementation_type: &'a TypeInfo,
    pub instance: &'a Instance,
}

/// Asks the unregistered type handlers for a registration of the type.
///
/// # Errors
/// Returns [`ResolveErrorKind::AmbiguousUnregisteredType`] if more than one registration was made
pub(crate) fn unregistered_type(container: &Container, service_type: &TypeInfo) -> Result<Option<Arc<Registration>>, ResolveErrorKind> {
    let handlers = container.frozen().unregistered_type_handlers.clone();
    if handlers.is_empty() {
        return Ok(None);
    }

    let mut args = UnregisteredTypeEventArgs {
        service_type: service_type.clone(),
        container: container.clone(),
        registrations: Vec::new(),
    };
    for handler in &handlers {
        handler(&mut args);
    }

    let mut registrations = args.registrations;
    match registrations.len() {
        0 => Ok(None),
        1 => Ok(registrations.pop()),
        _ => Err(ResolveErrorKind::AmbiguousUnregisteredType {
            service_type: service_type.clone(),
        }),
    }
}

pub(crate) fn expression_building(container: &Container, registration: &Registration, plan: Plan) -> Plan {
    let handlers = container.frozen().expression_building_handlers.clone();
    if handlers.is_empty() {
        return plan;
    }

    let mut args = ExpressionBuildingEventArgs {
        implementation_type: registration.implementation_type().clone(),
        lifestyle: registration.lifestyle().clone(),
        plan,
        relationships: Vec::new(),
    };
    for handler in &handlers {
        handler(&mut args);
    }

    registration.add_relationships(args.relationships);
    args.plan
}

pub(crate) fn expression_built(container: &Container, producer: &InstanceProducer, plan: Plan) -> Plan {
    let handlers = container.frozen().expression_built_handlers.clone();
    if handlers.is_empty() {
        return plan;
    }

    let mut args = ExpressionBuiltEventArgs {
        service_type: producer.service_type().clone(),
        implementation_type: producer.implementation_type().clone(),
        lifestyle: producer.lifestyle().clone(),
        plan,
    };
    for handler in &handlers {
        handler(&mut args);
    }
    args.plan
}

pub(crate) fn instance_created(container: &Container, implementation_type: &TypeInfo, instance: &Instance) {
    let frozen = container.frozen();
    if frozen.instance_created_handlers.is_empty() {
        return;
    }

    let args = InstanceCreatedEventArgs {
        implementation_type,
        instance,
    };
    for handler in &frozen.instance_created_handlers {
        handler(&args);
    }
}
