pub(crate) mod catalog;
pub(crate) mod collection;
pub(crate) mod config;
pub(crate) mod container;
pub(crate) mod cycle;
pub(crate) mod decorator;
pub(crate) mod events;
pub(crate) mod generics;
pub(crate) mod instance;
pub(crate) mod introspector;
pub(crate) mod lifestyle;
pub(crate) mod plan;
pub(crate) mod producer;
pub(crate) mod registration;
pub(crate) mod registry;
pub(crate) mod scope;
pub(crate) mod types;

pub mod errors;

pub use catalog::TypeCatalog;
pub use collection::Collection;
pub use config::ContainerOptions;
pub use container::Container;
pub use decorator::{DecoratorPredicate, DecoratorPredicateContext, DecoratorTypeFactory};
pub use errors::{RegistrationErrorKind, ResolveErrorKind, ScopeErrorKind, SharedError};
pub use events::{
    ExpressionBuildingEventArgs, ExpressionBuildingHandler, ExpressionBuiltEventArgs, ExpressionBuiltHandler,
    InstanceCreatedEventArgs, InstanceCreatedHandler, UnregisteredTypeEventArgs, UnregisteredTypeHandler,
};
pub use generics::{OpenGenericPredicate, OpenGenericPredicateContext};
pub use instance::{Disposable, Instance, IntoInstance};
pub use introspector::{
    Activator, ConstructorInfo, GenericConstraint, GenericParameter, ParameterInfo, TypeDescriptor, TypeIntrospector,
    TypeKind,
};
pub use lifestyle::{CustomLifestyle, HybridLifestyle, Lifestyle};
pub use plan::{Factory, Plan, Resolution};
pub use producer::InstanceProducer;
pub use registration::{KnownRelationship, Registration, RegistrationKind};
pub use registry::ContainerState;
pub use scope::Scope;
pub use types::{Bindings, TypeInfo};
