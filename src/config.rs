use crate::lifestyle::Lifestyle;

/// Options of a container
/// ## Fields
/// - `allow_overriding_registrations`:
///   If `true`, registering a service type again replaces the previous registration,
///   otherwise it fails with [`crate::errors::RegistrationErrorKind::AlreadyRegistered`].
///
/// - `default_lifestyle`:
///   Lifestyle of registrations made without an explicit one, of concrete types created automatically
///   and of collection elements that aren't registered themselves.
///
/// - `resolve_unregistered_concrete_types`:
///   If `true`, a class that isn't registered is created with its single public constructor.
///   Interfaces, abstract classes and structs are never created automatically.
#[derive(Clone, Debug)]
pub struct ContainerOptions {
    pub allow_overriding_registrations: bool,
    pub default_lifestyle: Lifestyle,
    pub resolve_unregistered_concrete_types: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            allow_overriding_registrations: false,
            default_lifestyle: Lifestyle::Transient,
            resolve_unregistered_concrete_types: true,
        }
    }
}
