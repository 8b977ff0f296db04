use parking_lot::Mutex;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, OnceLock, Weak},
};
use tracing::debug;

use crate::{
    container::{Container, ContainerInner},
    cycle::{CycleGuard, Frame},
    errors::{RegistrationErrorKind, ResolveErrorKind, SharedError},
    events,
    instance::Instance,
    introspector::ConstructorInfo,
    lifestyle::{InstanceCache, Lifestyle},
    plan::{Factory, Plan, Resolution},
    producer::InstanceProducer,
    registry::next_id,
    types::{bind_definition, TypeInfo},
};

pub(crate) type FactoryFn = Arc<dyn Fn(&Resolution) -> anyhow::Result<Option<Instance>> + Send + Sync>;
pub(crate) type PlanBuilder =
    Arc<dyn Fn(&Container) -> Result<(Plan, Vec<KnownRelationship>), ResolveErrorKind> + Send + Sync>;

/// An edge of the dependency graph
#[derive(Clone)]
pub struct KnownRelationship {
    /// The consumer
    pub implementation_type: TypeInfo,
    /// Lifestyle of the consumer
    pub lifestyle: Lifestyle,
    pub dependency: Arc<InstanceProducer>,
}

impl Debug for KnownRelationship {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownRelationship")
            .field("implementation_type", &self.implementation_type)
            .field("lifestyle", &self.lifestyle)
            .field("dependency", self.dependency.service_type())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationKind {
    Constructor,
    Factory,
    Instance,
    Decorator,
    Collection,
    Func,
}

pub(crate) enum Source {
    Constructor,
    Factory(FactoryFn),
    Instance(Instance),
    Decorator(Plan),
    Collection(PlanBuilder),
    Func(PlanBuilder),
}

/// How instances of one implementation type are produced under one lifestyle.
///
/// Owns the lazily built construction plan and the lifestyle cache, so producers sharing a registration share its instances.
pub struct Registration {
    id: u64,
    implementation_type: TypeInfo,
    lifestyle: Lifestyle,
    source: Source,
    container: Weak<ContainerInner>,
    plan: OnceLock<Result<Plan, ResolveErrorKind>>,
    cache: InstanceCache,
    relationships: Mutex<Vec<KnownRelationship>>,
}

impl Registration {
    #[must_use]
    pub(crate) fn new(implementation_type: TypeInfo, lifestyle: Lifestyle, source: Source, container: &Container) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            cache: lifestyle.create_cache(),
            implementation_type,
            lifestyle,
            source,
            container: container.downgrade(),
            plan: OnceLock::new(),
            relationships: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
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

    #[must_use]
    pub fn kind(&self) -> RegistrationKind {
        match self.source {
            Source::Constructor => RegistrationKind::Constructor,
            Source::Factory(_) => RegistrationKind::Factory,
            Source::Instance(_) => RegistrationKind::Instance,
            Source::Decorator(_) => RegistrationKind::Decorator,
            Source::Collection(_) => RegistrationKind::Collection,
            Source::Func(_) => RegistrationKind::Func,
        }
    }

    /// Relationships known after the plan is built
    #[must_use]
    pub fn relationships(&self) -> Vec<KnownRelationship> {
        self.relationships.lock().clone()
    }

    pub(crate) fn add_relationships(&self, relationships: impl IntoIterator<Item = KnownRelationship>) {
        self.relationships.lock().extend(relationships);
    }

    /// The plan before lifestyle caching, built once
    pub(crate) fn base_plan(&self) -> Result<Plan, ResolveErrorKind> {
        if let Some(result) = self.plan.get() {
            return result.clone();
        }
        let Some(container) = Container::upgrade(&self.container) else {
            return Err(ResolveErrorKind::ContainerDropped {
                service_type: self.implementation_type.clone(),
            });
        };

        let _lock = container.build_lock();
        let _guard = CycleGuard::enter(Frame::Building(self.id), &self.implementation_type)?;
        self.plan
            .get_or_init(|| {
                debug!(implementation = %self.implementation_type, lifestyle = %self.lifestyle, "Building plan");
                self.build_base_plan(&container)
            })
            .clone()
    }

    fn build_base_plan(&self, container: &Container) -> Result<Plan, ResolveErrorKind> {
        let (plan, relationships) = match &self.source {
            Source::Constructor => {
                let constructor = ConstructorPlan::resolve(container, self.id, &self.implementation_type, None)?;
                let relationships = constructor.relationships(&self.lifestyle);
                let constructor = Arc::new(constructor);
                let plan = Plan::new(move |resolution| constructor.invoke(resolution, None));
                (plan, relationships)
            }
            Source::Factory(factory) => (factory_plan(self.id, self.implementation_type.clone(), factory.clone()), Vec::new()),
            Source::Instance(instance) => (Plan::constant(instance.clone()), Vec::new()),
            Source::Decorator(plan) => return Ok(plan.clone()),
            Source::Collection(builder) | Source::Func(builder) => return Ok(self.accept(builder(container)?)),
        };

        let plan = self.accept((plan, relationships));
        Ok(events::expression_building(container, self, plan))
    }

    fn accept(&self, (plan, relationships): (Plan, Vec<KnownRelationship>)) -> Plan {
        self.add_relationships(relationships);
        plan
    }

    /// Gets the instance from the lifestyle cache or creates it
    pub(crate) fn instance(&self, resolution: &Resolution) -> Result<Instance, ResolveErrorKind> {
        let plan = self.base_plan()?;
        self.cache
            .get_or_create(self.id, &self.implementation_type, resolution, &|| plan.call(resolution))
    }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("implementation_type", &self.implementation_type)
            .field("lifestyle", &self.lifestyle)
            .field("kind", &self.kind())
            .finish()
    }
}

fn factory_plan(registration_id: u64, service_type: TypeInfo, factory: FactoryFn) -> Plan {
    Plan::new(move |resolution| {
        create(resolution, registration_id, &service_type, Origin::Factory, || factory(resolution))
    })
}

#[derive(Clone, Copy)]
pub(crate) enum Origin {
    Factory,
    Constructor,
}

/// Runs user code creating an instance of `ty`, guarded against re-entering the same registration
pub(crate) fn create(
    resolution: &Resolution,
    registration_id: u64,
    ty: &TypeInfo,
    origin: Origin,
    f: impl FnOnce() -> anyhow::Result<Option<Instance>>,
) -> Result<Instance, ResolveErrorKind> {
    let guard = CycleGuard::enter(Frame::Creating(registration_id), ty)?;
    let result = f();
    drop(guard);

    let instance = match result {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            return Err(ResolveErrorKind::NullInstance {
                service_type: ty.clone(),
            })
        }
        Err(err) => {
            return Err(match err.downcast::<ResolveErrorKind>() {
                Ok(err) => err,
                Err(err) => match origin {
                    Origin::Factory => ResolveErrorKind::Factory {
                        service_type: ty.clone(),
                        source: SharedError::new(err),
                    },
                    Origin::Constructor => ResolveErrorKind::Activation {
                        implementation_type: ty.clone(),
                        source: SharedError::new(err),
                    },
                },
            })
        }
    };

    debug!(implementation = %ty, "Instance created");
    events::instance_created(resolution.container(), ty, &instance);
    Ok(instance)
}

pub(crate) enum Argument {
    Dependency(Arc<InstanceProducer>),
    Decoratee,
    DecorateeFactory,
}

/// The decorated value, passed to a decorator's constructor
#[derive(Clone, Copy)]
pub(crate) enum Decoratee<'a> {
    Plan(&'a Plan),
    Instance(&'a Instance),
}

/// The single public constructor of a type with its resolved parameters
pub(crate) struct ConstructorPlan {
    creation_id: u64,
    implementation_type: TypeInfo,
    constructor: ConstructorInfo,
    arguments: Vec<Argument>,
    decoratee_type: Option<TypeInfo>,
}

impl ConstructorPlan {
    /// Resolves the constructor parameters.
    /// With `decoratee_type`, the parameter of that type (or of `Func<decoratee_type>`) is left for the decoratee.
    pub(crate) fn resolve(
        container: &Container,
        creation_id: u64,
        implementation_type: &TypeInfo,
        decoratee_type: Option<&TypeInfo>,
    ) -> Result<Self, ResolveErrorKind> {
        let Some(descriptor) = container.introspector().describe(implementation_type) else {
            return Err(RegistrationErrorKind::UnknownType {
                ty: implementation_type.clone(),
            }
            .into());
        };
        if descriptor.constructors.len() != 1 {
            return Err(ResolveErrorKind::ConstructorCount {
                implementation_type: implementation_type.clone(),
                count: descriptor.constructors.len(),
            });
        }

        let constructor = descriptor.constructors[0].clone();
        let bindings = bind_definition(&descriptor.definition, implementation_type);

        let mut arguments = Vec::with_capacity(constructor.parameters.len());
        let mut decoratee_taken = false;
        for parameter in &constructor.parameters {
            let parameter_type = parameter.parameter_type.substitute(&bindings);

            if let (Some(decoratee_type), false) = (decoratee_type, decoratee_taken) {
                if parameter_type == *decoratee_type {
                    decoratee_taken = true;
                    arguments.push(Argument::Decoratee);
                    continue;
                }
                if parameter_type.func_product() == Some(decoratee_type) {
                    decoratee_taken = true;
                    arguments.push(Argument::DecorateeFactory);
                    continue;
                }
            }

            let Some(producer) = container.lookup(&parameter_type)? else {
                return Err(ResolveErrorKind::MissingDependency {
                    consumer: implementation_type.clone(),
                    parameter: parameter.name.to_string(),
                    dependency: parameter_type,
                });
            };
            producer.build_plan()?;
            arguments.push(Argument::Dependency(producer));
        }

        Ok(Self {
            creation_id,
            implementation_type: implementation_type.clone(),
            constructor,
            arguments,
            decoratee_type: decoratee_type.cloned(),
        })
    }

    #[must_use]
    pub(crate) fn relationships(&self, lifestyle: &Lifestyle) -> Vec<KnownRelationship> {
        self.arguments
            .iter()
            .filter_map(|argument| match argument {
                Argument::Dependency(producer) => Some(KnownRelationship {
                    implementation_type: self.implementation_type.clone(),
                    lifestyle: lifestyle.clone(),
                    dependency: producer.clone(),
                }),
                Argument::Decoratee | Argument::DecorateeFactory => None,
            })
            .collect()
    }

    #[must_use]
    pub(crate) fn takes_decoratee_factory(&self) -> bool {
        self.arguments
            .iter()
            .any(|argument| matches!(argument, Argument::DecorateeFactory))
    }

    pub(crate) fn invoke(&self, resolution: &Resolution, decoratee: Option<Decoratee<'_>>) -> Result<Instance, ResolveErrorKind> {
        let mut values = Vec::with_capacity(self.arguments.len());
        for argument in &self.arguments {
            let value = match (argument, decoratee) {
                (Argument::Dependency(producer), _) => producer.instance(resolution)?,
                (Argument::Decoratee, Some(Decoratee::Plan(plan))) => plan.call(resolution)?,
                (Argument::Decoratee, Some(Decoratee::Instance(instance))) => instance.clone(),
                (Argument::DecorateeFactory, Some(Decoratee::Plan(plan))) => {
                    let service_type = self.decoratee_type.clone().unwrap_or_else(|| self.implementation_type.clone());
                    Instance::new(Factory::new(service_type, plan.clone(), resolution))
                }
                (Argument::DecorateeFactory, Some(Decoratee::Instance(_))) => {
                    return Err(ResolveErrorKind::FuncDecoratorOnUncontrolledCollection {
                        decorator_type: self.implementation_type.clone(),
                        service_type: self.decoratee_type.clone().unwrap_or_else(|| self.implementation_type.clone()),
                    })
                }
                (Argument::Decoratee | Argument::DecorateeFactory, None) => {
                    return Err(ResolveErrorKind::NotRegistered {
                        service_type: self.decoratee_type.clone().unwrap_or_else(|| self.implementation_type.clone()),
                    })
                }
            };
            values.push(value);
        }

        create(resolution, self.creation_id, &self.implementation_type, Origin::Constructor, || {
            self.constructor.activate(&self.implementation_type, values).map(Some)
        })
    }
}
