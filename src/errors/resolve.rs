use super::{RegistrationErrorKind, SharedError};
use crate::types::TypeInfo;

/// Activation errors.
///
/// `Clone` so that a failed build or a failed singleton creation is replayed as is on every subsequent call.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ResolveErrorKind {
    #[error(
        "No registration for type {service_type} could be found. \
        Register the type, or make sure it's a concrete class that can be created automatically"
    )]
    NotRegistered { service_type: TypeInfo },
    #[error(
        "The constructor of type {consumer} contains the parameter with name '{parameter}' and type {dependency} \
        that is not registered. Please ensure {dependency} is registered, or change the constructor of {consumer}"
    )]
    MissingDependency {
        consumer: TypeInfo,
        parameter: String,
        dependency: TypeInfo,
    },
    #[error(
        "For the container to be able to create {implementation_type}, it should have exactly one public constructor, \
        it has {count}. Remove the extra constructors or register a factory"
    )]
    ConstructorCount { implementation_type: TypeInfo, count: usize },
    #[error(
        "The configuration is invalid. The type {implementation_type} is directly or indirectly depending on itself. \
        Break the cycle by changing one of the constructors in the chain"
    )]
    CyclicDependency { implementation_type: TypeInfo },
    #[error(
        "Multiple observers of the unregistered type event have registered a delegate for the same service type \
        {service_type}. Make sure only one of the handlers registers for a given type"
    )]
    AmbiguousUnregisteredType { service_type: TypeInfo },
    #[error(
        "Multiple open generic registrations accept the request for {service_type}: {first} and {second}. \
        Make their predicates mutually exclusive"
    )]
    AmbiguousOpenGeneric {
        service_type: TypeInfo,
        first: TypeInfo,
        second: TypeInfo,
    },
    #[error("The registered delegate for type {service_type} failed: {source}")]
    Factory { service_type: TypeInfo, source: SharedError },
    #[error("Creating an instance of {implementation_type} failed: {source}")]
    Activation {
        implementation_type: TypeInfo,
        source: SharedError,
    },
    #[error("The registered delegate for type {service_type} returned no instance. Return an instance instead")]
    NullInstance { service_type: TypeInfo },
    #[error(
        "Impossible to use decorator {decorator_type}, because it depends on Func<{service_type}> \
        while the registered collection of {service_type} is not controlled by the container. \
        Use one of the `register_collection` overloads that take a list of types"
    )]
    FuncDecoratorOnUncontrolledCollection {
        decorator_type: TypeInfo,
        service_type: TypeInfo,
    },
    #[error(
        "You are trying to apply the decorator {decorator_type} with the {lifestyle} lifestyle to the collection \
        of {service_type}, but the registered collection is not controlled by the container. \
        Since the number of items might change on each call, only transient decorators can be applied. \
        Register the collection with `register_collection` or use the transient lifestyle"
    )]
    UncontrolledCollectionLifestyle {
        decorator_type: TypeInfo,
        service_type: TypeInfo,
        lifestyle: String,
    },
    #[error("Cannot resolve {service_type} from a scope that has been disposed. Begin a new scope instead")]
    ScopeDisposed { service_type: TypeInfo },
    #[error("The container was dropped before {service_type} could be resolved")]
    ContainerDropped { service_type: TypeInfo },
    #[error("The instance resolved for {service_type} is not of type `{expected}`")]
    TypeMismatch {
        service_type: TypeInfo,
        expected: &'static str,
    },
    #[error(transparent)]
    InvalidConfiguration(#[from] RegistrationErrorKind),
    #[error("The configuration is invalid. Resolving {service_type} failed: {source}")]
    Verification {
        service_type: TypeInfo,
        source: Box<ResolveErrorKind>,
    },
}
