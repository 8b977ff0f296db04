use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};
use tracing::debug;

use crate::{
    container::Container,
    errors::{RegistrationErrorKind, ResolveErrorKind},
    generics::{close_implementation, unify},
    instance::Instance,
    introspector::{closed_bases, TypeIntrospector},
    lifestyle::Lifestyle,
    plan::{Plan, Resolution},
    producer::InstanceProducer,
    registration::{ConstructorPlan, Decoratee, Registration, Source},
    registry::next_id,
    types::{bind_definition, Bindings, TypeInfo},
};

/// Describes one candidate decoration point
#[derive(Clone)]
pub struct DecoratorPredicateContext {
    pub service_type: TypeInfo,
    /// The implementation when known, the service type for elements of container-uncontrolled collections
    pub implementation_type: TypeInfo,
    /// Decorators applied so far at this point, innermost first
    pub applied_decorators: Vec<TypeInfo>,
    /// The plan built so far, `None` for elements of container-uncontrolled collections
    pub plan: Option<Plan>,
}

impl Debug for DecoratorPredicateContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorPredicateContext")
            .field("service_type", &self.service_type)
            .field("implementation_type", &self.implementation_type)
            .field("applied_decorators", &self.applied_decorators)
            .finish_non_exhaustive()
    }
}

pub type DecoratorPredicate = Arc<dyn Fn(&DecoratorPredicateContext) -> bool + Send + Sync>;
pub type DecoratorTypeFactory = Arc<dyn Fn(&DecoratorPredicateContext) -> TypeInfo + Send + Sync>;

pub(crate) enum DecoratorTarget {
    Type(TypeInfo),
    Factory(DecoratorTypeFactory),
}

/// A registered decorator, applied lazily to matching producers and collection elements
pub(crate) struct DecoratorRule {
    service_type: TypeInfo,
    target: DecoratorTarget,
    lifestyle: Lifestyle,
    predicate: Option<DecoratorPredicate>,
}

impl DecoratorRule {
    #[must_use]
    pub(crate) fn new(
        service_type: TypeInfo,
        target: DecoratorTarget,
        lifestyle: Lifestyle,
        predicate: Option<DecoratorPredicate>,
    ) -> Self {
        Self {
            service_type,
            target,
            lifestyle,
            predicate,
        }
    }

    fn applies_to(&self, service_type: &TypeInfo) -> bool {
        if self.service_type.is_open() {
            unify(&self.service_type, service_type, &mut Bindings::new())
        } else {
            self.service_type == *service_type
        }
    }

    fn accepts(&self, context: &DecoratorPredicateContext) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(context))
    }

    /// The decorator closed for the service, `None` if an open decorator can't be closed for it
    fn decorator_type(
        &self,
        introspector: &dyn TypeIntrospector,
        context: &DecoratorPredicateContext,
    ) -> Result<Option<TypeInfo>, ResolveErrorKind> {
        let decorator_type = match &self.target {
            DecoratorTarget::Type(decorator_type) => decorator_type.clone(),
            DecoratorTarget::Factory(factory) => {
                let decorator_type = factory(context);
                validate_decorator(introspector, &context.service_type, &decorator_type)?;
                decorator_type
            }
        };

        if decorator_type.is_open() {
            return Ok(close_implementation(introspector, &context.service_type, &decorator_type));
        }
        Ok(Some(decorator_type))
    }
}

/// Checks the decorator is concrete, implements the service and has a single constructor
/// taking exactly one decoratee, of the service type or of `Func` of it
pub(crate) fn validate_decorator(
    introspector: &dyn TypeIntrospector,
    service_type: &TypeInfo,
    decorator_type: &TypeInfo,
) -> Result<(), RegistrationErrorKind> {
    let invalid = |reason: String| RegistrationErrorKind::InvalidDecorator {
        decorator_type: decorator_type.clone(),
        service_type: service_type.clone(),
        reason,
    };

    let Some(descriptor) = introspector.describe(decorator_type) else {
        return Err(RegistrationErrorKind::UnknownType {
            ty: decorator_type.clone(),
        });
    };
    if !descriptor.kind.is_concrete() {
        return Err(RegistrationErrorKind::NotConcrete {
            implementation_type: decorator_type.clone(),
        });
    }

    let by_definition = service_type.is_open() || decorator_type.is_open();
    let matches_service = |ty: &TypeInfo| {
        if by_definition {
            ty.same_definition(service_type)
        } else {
            ty == service_type
        }
    };
    let mut decoratee_types = closed_bases(introspector, decorator_type);
    decoratee_types.retain(|ty| matches_service(ty));
    if decoratee_types.is_empty() {
        return Err(RegistrationErrorKind::NotAssignable {
            service_type: service_type.clone(),
            implementation_type: decorator_type.clone(),
        });
    }

    let [constructor] = descriptor.constructors.as_slice() else {
        return Err(invalid(format!(
            "it must have exactly one public constructor, it has {}",
            descriptor.constructors.len()
        )));
    };

    let bindings = bind_definition(&descriptor.definition, decorator_type);
    let decoratees = constructor
        .parameters
        .iter()
        .map(|parameter| parameter.parameter_type.substitute(&bindings))
        .filter(|ty| {
            decoratee_types.contains(ty)
                || ty
                    .func_product()
                    .is_some_and(|product| decoratee_types.contains(product))
        })
        .count();
    if decoratees != 1 {
        return Err(invalid(format!(
            "its constructor must have exactly one parameter of type {service_type} or Func<{service_type}>, it has {decoratees}"
        )));
    }

    Ok(())
}

/// Wraps the plan of the producer in the decorators registered for its service, in registration order
pub(crate) fn decorate(container: &Container, producer: &InstanceProducer, plan: Plan) -> Result<Plan, ResolveErrorKind> {
    let service_type = producer.service_type();
    let rules = container.decorators();
    let mut plan = plan;
    let mut applied = Vec::new();

    for rule in rules.iter().filter(|rule| rule.applies_to(service_type)) {
        let context = DecoratorPredicateContext {
            service_type: service_type.clone(),
            implementation_type: producer.implementation_type().clone(),
            applied_decorators: applied.clone(),
            plan: Some(plan.clone()),
        };
        let Some(decorator_type) = rule.decorator_type(container.introspector(), &context)? else {
            continue;
        };
        if !rule.accepts(&context) {
            debug!(decorator = %decorator_type, "Decorator predicate rejected");
            continue;
        }
        debug!(decorator = %decorator_type, service = %service_type, "Applying decorator");

        let constructor = ConstructorPlan::resolve(container, next_id(), &decorator_type, Some(service_type))?;
        let relationships = constructor.relationships(&rule.lifestyle);
        let constructor = Arc::new(constructor);
        let decoratee = plan;
        let decorator_plan = Plan::new(move |resolution| constructor.invoke(resolution, Some(Decoratee::Plan(&decoratee))));

        let registration = Registration::new(
            decorator_type.clone(),
            rule.lifestyle.clone(),
            Source::Decorator(decorator_plan),
            container,
        );
        registration.add_relationships(relationships.clone());
        producer.add_relationships(relationships);

        plan = Plan::new(move |resolution| registration.instance(resolution));
        applied.push(decorator_type);
    }

    Ok(plan)
}

/// A decorator applied to every element of a container-uncontrolled collection
pub(crate) struct ElementDecorator {
    decorator_type: TypeInfo,
    lifestyle: Lifestyle,
    constructor: ConstructorPlan,
}

/// Decorators of a container-uncontrolled collection, the predicates see the service type as the implementation
pub(crate) fn uncontrolled_decorators(container: &Container, service_type: &TypeInfo) -> Result<Vec<ElementDecorator>, ResolveErrorKind> {
    let rules = container.decorators();
    let mut decorators = Vec::new();
    let mut applied: Vec<TypeInfo> = Vec::new();

    for rule in rules.iter().filter(|rule| rule.applies_to(service_type)) {
        let context = DecoratorPredicateContext {
            service_type: service_type.clone(),
            implementation_type: service_type.clone(),
            applied_decorators: applied.clone(),
            plan: None,
        };
        let Some(decorator_type) = rule.decorator_type(container.introspector(), &context)? else {
            continue;
        };
        if !rule.accepts(&context) {
            continue;
        }

        let constructor = ConstructorPlan::resolve(container, next_id(), &decorator_type, Some(service_type))?;
        if constructor.takes_decoratee_factory() {
            return Err(ResolveErrorKind::FuncDecoratorOnUncontrolledCollection {
                decorator_type,
                service_type: service_type.clone(),
            });
        }

        debug!(decorator = %decorator_type, service = %service_type, "Decorating uncontrolled collection");
        applied.push(decorator_type.clone());
        decorators.push(ElementDecorator {
            decorator_type,
            lifestyle: rule.lifestyle.clone(),
            constructor,
        });
    }

    Ok(decorators)
}

/// Wraps one element of a container-uncontrolled collection
pub(crate) fn decorate_element(
    decorators: &[ElementDecorator],
    service_type: &TypeInfo,
    resolution: &Resolution,
    element: Instance,
) -> Result<Instance, ResolveErrorKind> {
    let mut instance = element;
    for decorator in decorators {
        if !decorator.lifestyle.is_transient() {
            return Err(ResolveErrorKind::UncontrolledCollectionLifestyle {
                decorator_type: decorator.decorator_type.clone(),
                service_type: service_type.clone(),
                lifestyle: decorator.lifestyle.name(),
            });
        }
        instance = decorator
            .constructor
            .invoke(resolution, Some(Decoratee::Instance(&instance)))?;
    }
    Ok(instance)
}
