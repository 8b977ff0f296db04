use crate::types::TypeInfo;

/// Configuration errors, returned by registration calls
#[derive(thiserror::Error, Debug, Clone)]
pub enum RegistrationErrorKind {
    #[error(
        "The container can't be changed after the first call to `get_instance`, `get_all_instances`, \
        `get_registration` or `verify`. Make all registrations before resolving"
    )]
    Locked,
    #[error(
        "Type {service_type} has already been registered. \
        Enable `ContainerOptions::allow_overriding_registrations` to replace the existing registration"
    )]
    AlreadyRegistered { service_type: TypeInfo },
    #[error("The given type {implementation_type} is not a concrete type. Register a class or a struct instead")]
    NotConcrete { implementation_type: TypeInfo },
    #[error(
        "The supplied type {implementation_type} is an open generic type. \
        Use `register_open_generic` to register open generic types"
    )]
    OpenGenericImplementation { implementation_type: TypeInfo },
    #[error(
        "The supplied type {ty} is not an open generic type. \
        Use `register` or `register_with` to register closed types"
    )]
    NotOpenGeneric { ty: TypeInfo },
    #[error(
        "The supplied service type {service_type} is an open generic type. \
        Use `register_open_generic` to register open generic types"
    )]
    OpenGenericService { service_type: TypeInfo },
    #[error(
        "The supplied type {implementation_type} does not implement {service_type}. \
        Register an implementation of {service_type}"
    )]
    NotAssignable {
        service_type: TypeInfo,
        implementation_type: TypeInfo,
    },
    #[error("The type {ty} is unknown to the type introspector. Describe it before registering it")]
    UnknownType { ty: TypeInfo },
    #[error(
        "The type parameters {parameters} of {implementation_type} can't be determined from {service_type}. \
        Every type parameter of the implementation must appear in the service type"
    )]
    UnresolvableTypeArguments {
        service_type: TypeInfo,
        implementation_type: TypeInfo,
        parameters: String,
    },
    #[error("The decorator {decorator_type} for {service_type} is invalid: {reason}")]
    InvalidDecorator {
        decorator_type: TypeInfo,
        service_type: TypeInfo,
        reason: String,
    },
}
