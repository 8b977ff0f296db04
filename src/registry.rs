use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    collection::CollectionSource,
    config::ContainerOptions,
    decorator::DecoratorRule,
    errors::RegistrationErrorKind,
    events::{ExpressionBuildingHandler, ExpressionBuiltHandler, InstanceCreatedHandler, UnregisteredTypeHandler},
    generics::OpenGenericPredicate,
    lifestyle::Lifestyle,
    producer::InstanceProducer,
    types::TypeInfo,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique id of a container, registration, producer, scope or cache
#[inline]
#[must_use]
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
    /// Registrations are accepted
    Mutable,
    /// Frozen by the first resolution, registrations are rejected
    Locked,
}

#[derive(Clone)]
pub(crate) struct OpenGenericRegistration {
    pub(crate) service_type: TypeInfo,
    pub(crate) implementation_type: TypeInfo,
    pub(crate) lifestyle: Lifestyle,
    pub(crate) predicate: Option<OpenGenericPredicate>,
}

/// Everything registered in a container, frozen into a snapshot when the container gets locked
#[derive(Clone)]
pub(crate) struct Registry {
    pub(crate) state: ContainerState,
    pub(crate) options: ContainerOptions,
    pub(crate) producers: BTreeMap<TypeInfo, Arc<InstanceProducer>>,
    /// Explicitly registered service types, in registration order
    pub(crate) order: Vec<TypeInfo>,
    pub(crate) open_generics: Vec<OpenGenericRegistration>,
    pub(crate) collections: BTreeMap<TypeInfo, CollectionSource>,
    pub(crate) decorators: Vec<Arc<DecoratorRule>>,
    pub(crate) unregistered_type_handlers: Vec<UnregisteredTypeHandler>,
    pub(crate) expression_building_handlers: Vec<ExpressionBuildingHandler>,
    pub(crate) expression_built_handlers: Vec<ExpressionBuiltHandler>,
    pub(crate) instance_created_handlers: Vec<InstanceCreatedHandler>,
}

impl Registry {
    #[must_use]
    pub(crate) fn new(options: ContainerOptions) -> Self {
        Self {
            state: ContainerState::Mutable,
            options,
            producers: BTreeMap::new(),
            order: Vec::new(),
            open_generics: Vec::new(),
            collections: BTreeMap::new(),
            decorators: Vec::new(),
            unregistered_type_handlers: Vec::new(),
            expression_building_handlers: Vec::new(),
            expression_built_handlers: Vec::new(),
            instance_created_handlers: Vec::new(),
        }
    }

    pub(crate) fn ensure_mutable(&self) -> Result<(), RegistrationErrorKind> {
        match self.state {
            ContainerState::Mutable => Ok(()),
            ContainerState::Locked => Err(RegistrationErrorKind::Locked),
        }
    }

    /// Stores the producer of an explicit registration
    pub(crate) fn add_producer(&mut self, producer: Arc<InstanceProducer>) -> Result<(), RegistrationErrorKind> {
        self.ensure_mutable()?;

        let service_type = producer.service_type().clone();
        if self.producers.contains_key(&service_type) {
            if !self.options.allow_overriding_registrations {
                return Err(RegistrationErrorKind::AlreadyRegistered { service_type });
            }
            self.order.retain(|ty| *ty != service_type);
        }
        self.order.push(service_type.clone());
        self.producers.insert(service_type, producer);
        Ok(())
    }

    /// Explicit producers in registration order
    #[must_use]
    pub(crate) fn ordered_producers(&self) -> Vec<Arc<InstanceProducer>> {
        self.order
            .iter()
            .filter_map(|ty| self.producers.get(ty).cloned())
            .collect()
    }
}
