use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};
use tracing::debug;

use crate::{
    container::Container,
    decorator::{decorate_element, uncontrolled_decorators},
    errors::ResolveErrorKind,
    generics::close_implementation,
    instance::Instance,
    introspector::is_assignable,
    lifestyle::Lifestyle,
    plan::{Plan, Resolution, WeakResolution},
    producer::{InstanceProducer, ProducerKind},
    registration::{KnownRelationship, PlanBuilder},
    types::TypeInfo,
};

pub(crate) type CollectionSourceFn = Arc<dyn Fn() -> Vec<Instance> + Send + Sync>;
type ElementsFn = Arc<dyn Fn(&Resolution) -> Result<Vec<Instance>, ResolveErrorKind> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum CollectionSource {
    /// The element types are known, each one is resolved through the container
    Controlled(Vec<TypeInfo>),
    /// An opaque source, evaluated on every iteration
    Uncontrolled(CollectionSourceFn),
}

/// Payload of `IEnumerable<T>`.
///
/// The elements are resolved again on every call of [`Collection::instances`], so transient elements are fresh each time.
pub struct Collection {
    service_type: TypeInfo,
    controlled: bool,
    elements: ElementsFn,
    resolution: WeakResolution,
}

impl Collection {
    #[inline]
    #[must_use]
    pub fn service_type(&self) -> &TypeInfo {
        &self.service_type
    }

    /// Whether the container knows the element types
    #[inline]
    #[must_use]
    pub fn is_controlled(&self) -> bool {
        self.controlled
    }

    /// Resolves the elements in the scope the collection was created in, or in the current one if that has ended.
    /// Scoped elements resolved with no scope at all are cached for the whole container.
    #[allow(clippy::missing_errors_doc)]
    pub fn instances(&self) -> Result<Vec<Instance>, ResolveErrorKind> {
        let resolution = self.resolution.upgrade(&self.service_type)?;
        (self.elements)(&resolution)
    }

    pub(crate) fn instances_for(&self, resolution: &Resolution) -> Result<Vec<Instance>, ResolveErrorKind> {
        (self.elements)(resolution)
    }
}

impl Debug for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("service_type", &self.service_type)
            .field("controlled", &self.controlled)
            .finish_non_exhaustive()
    }
}

/// Builds the plan of the `IEnumerable<service_type>` producer, no source means an empty collection
#[must_use]
pub(crate) fn collection_builder(service_type: TypeInfo, source: Option<CollectionSource>) -> PlanBuilder {
    Arc::new(move |container: &Container| -> Result<(Plan, Vec<KnownRelationship>), ResolveErrorKind> {
        let (elements, controlled, relationships) = match &source {
            Some(CollectionSource::Uncontrolled(source)) => (uncontrolled_elements(container, &service_type, source.clone())?, false, Vec::new()),
            Some(CollectionSource::Controlled(types)) => {
                let (elements, relationships) = controlled_elements(container, &service_type, types)?;
                (elements, true, relationships)
            }
            None => {
                debug!(service = %service_type, "No collection registered, resolving as empty");
                (Arc::new(|_: &Resolution| Ok(Vec::new())) as ElementsFn, true, Vec::new())
            }
        };

        let service_type = service_type.clone();
        let plan = Plan::new(move |resolution| {
            Ok(Instance::new(Collection {
                service_type: service_type.clone(),
                controlled,
                elements: elements.clone(),
                resolution: WeakResolution::new(resolution),
            }))
        });
        Ok((plan, relationships))
    })
}

fn controlled_elements(
    container: &Container,
    service_type: &TypeInfo,
    types: &[TypeInfo],
) -> Result<(ElementsFn, Vec<KnownRelationship>), ResolveErrorKind> {
    let collection_type = TypeInfo::enumerable(service_type.clone());
    let mut producers = Vec::with_capacity(types.len());
    let mut relationships = Vec::with_capacity(types.len());

    for ty in types {
        let element_type = if ty.is_open() {
            match close_implementation(container.introspector(), service_type, ty) {
                Some(closed) => closed,
                None => {
                    debug!(element = %ty, service = %service_type, "Element doesn't match, skipped");
                    continue;
                }
            }
        } else if is_assignable(container.introspector(), service_type, ty) {
            ty.clone()
        } else {
            debug!(element = %ty, service = %service_type, "Element doesn't match, skipped");
            continue;
        };

        let registration = match container.lookup(&element_type)? {
            Some(producer) => producer.registration().clone(),
            None => container
                .options()
                .default_lifestyle
                .create_registration(element_type, container)?,
        };
        let producer = InstanceProducer::with_kind(service_type.clone(), registration, ProducerKind::Element, container);
        producer.build_plan()?;

        relationships.push(KnownRelationship {
            implementation_type: collection_type.clone(),
            lifestyle: Lifestyle::Transient,
            dependency: producer.clone(),
        });
        producers.push(producer);
    }

    debug!(service = %service_type, count = producers.len(), "Controlled collection built");
    let elements: ElementsFn = Arc::new(move |resolution: &Resolution| -> Result<Vec<Instance>, ResolveErrorKind> {
        producers
            .iter()
            .map(|producer| producer.instance(resolution))
            .collect()
    });
    Ok((elements, relationships))
}

fn uncontrolled_elements(
    container: &Container,
    service_type: &TypeInfo,
    source: CollectionSourceFn,
) -> Result<ElementsFn, ResolveErrorKind> {
    let decorators = uncontrolled_decorators(container, service_type)?;
    let service_type = service_type.clone();

    Ok(Arc::new(move |resolution: &Resolution| -> Result<Vec<Instance>, ResolveErrorKind> {
        let elements = source();
        if decorators.is_empty() {
            return Ok(elements);
        }
        elements
            .into_iter()
            .map(|element| decorate_element(&decorators, &service_type, resolution, element))
            .collect()
    }))
}
