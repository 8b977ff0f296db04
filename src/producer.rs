use parking_lot::Mutex;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock, Weak},
};
use tracing::{debug, error, info_span};

use crate::{
    container::{Container, ContainerInner},
    cycle::{CycleGuard, Frame},
    decorator,
    errors::ResolveErrorKind,
    events,
    instance::Instance,
    lifestyle::Lifestyle,
    plan::{Plan, Resolution},
    registration::{KnownRelationship, Registration},
    registry::next_id,
    types::TypeInfo,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProducerKind {
    /// Resolves a service, decorated and intercepted by the expression-built event
    Service,
    /// Produces an element of a container-controlled collection of the service, decorated per element
    Element,
}

/// Binds a service type to a registration.
///
/// The final plan (lifestyle cache, decorators, expression-built interception) is built once, failures included.
pub struct InstanceProducer {
    id: u64,
    service_type: TypeInfo,
    registration: Arc<Registration>,
    kind: ProducerKind,
    container: Weak<ContainerInner>,
    plan: OnceLock<Result<Plan, ResolveErrorKind>>,
    relationships: Mutex<Vec<KnownRelationship>>,
}

impl InstanceProducer {
    #[must_use]
    pub(crate) fn new(service_type: TypeInfo, registration: Arc<Registration>, container: &Container) -> Arc<Self> {
        Self::with_kind(service_type, registration, ProducerKind::Service, container)
    }

    #[must_use]
    pub(crate) fn with_kind(
        service_type: TypeInfo,
        registration: Arc<Registration>,
        kind: ProducerKind,
        container: &Container,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            service_type,
            registration,
            kind,
            container: container.downgrade(),
            plan: OnceLock::new(),
            relationships: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &TypeInfo {
        &self.service_type
    }

    #[inline]
    #[must_use]
    pub fn implementation_type(&self) -> &TypeInfo {
        self.registration.implementation_type()
    }

    #[inline]
    #[must_use]
    pub fn lifestyle(&self) -> &Lifestyle {
        self.registration.lifestyle()
    }

    #[inline]
    #[must_use]
    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    /// Relationships of the registration and of the decorators applied to this producer
    #[must_use]
    pub fn relationships(&self) -> Vec<KnownRelationship> {
        let mut relationships = self.registration.relationships();
        relationships.extend(self.relationships.lock().iter().cloned());
        relationships
    }

    pub(crate) fn add_relationships(&self, relationships: impl IntoIterator<Item = KnownRelationship>) {
        self.relationships.lock().extend(relationships);
    }

    /// Builds the final plan, or returns the one built before.
    ///
    /// # Errors
    /// Returns the build failure, the same one on every call
    pub fn build_plan(&self) -> Result<Plan, ResolveErrorKind> {
        if let Some(result) = self.plan.get() {
            return result.clone();
        }
        let Some(container) = Container::upgrade(&self.container) else {
            return Err(ResolveErrorKind::ContainerDropped {
                service_type: self.service_type.clone(),
            });
        };

        let _lock = container.build_lock();
        let _guard = CycleGuard::enter(Frame::Building(self.id), self.registration.implementation_type())?;
        self.plan.get_or_init(|| self.build(&container)).clone()
    }

    fn build(&self, container: &Container) -> Result<Plan, ResolveErrorKind> {
        debug!(service = %self.service_type, implementation = %self.implementation_type(), "Building producer");

        self.registration.base_plan()?;
        let registration = self.registration.clone();
        let plan = Plan::new(move |resolution| registration.instance(resolution));

        let plan = decorator::decorate(container, self, plan)?;
        match self.kind {
            ProducerKind::Service => Ok(events::expression_built(container, self, plan)),
            ProducerKind::Element => Ok(plan),
        }
    }

    /// Gets an instance in the current scope of the calling thread
    ///
    /// # Errors
    /// Returns the build or the creation failure
    pub fn get_instance(&self) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("get_instance", service = %self.service_type);
        let _guard = span.enter();

        let Some(container) = Container::upgrade(&self.container) else {
            let err = ResolveErrorKind::ContainerDropped {
                service_type: self.service_type.clone(),
            };
            error!("{}", err);
            return Err(err);
        };
        container.lock_state();

        let result = self.instance(&Resolution::ambient(container));
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    pub(crate) fn instance(&self, resolution: &Resolution) -> Result<Instance, ResolveErrorKind> {
        self.build_plan()?.call(resolution)
    }
}

impl Debug for InstanceProducer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProducer")
            .field("service_type", &self.service_type)
            .field("implementation_type", self.implementation_type())
            .field("lifestyle", self.lifestyle())
            .finish_non_exhaustive()
    }
}
