use std::sync::Arc;
use tracing::debug;

use crate::{
    errors::RegistrationErrorKind,
    introspector::{closed_bases, constraints_hold, TypeIntrospector},
    types::{Bindings, TypeInfo},
};

/// Context of an open generic predicate
#[derive(Clone, Debug)]
pub struct OpenGenericPredicateContext {
    /// The closed service type requested
    pub service_type: TypeInfo,
    /// The implementation closed for the request
    pub implementation_type: TypeInfo,
    /// Whether an earlier registration already accepted the request
    pub handled: bool,
}

pub type OpenGenericPredicate = Arc<dyn Fn(&OpenGenericPredicateContext) -> bool + Send + Sync>;

/// Binds the parameters of `pattern` so that it equals `concrete`.
/// Returns `false` when the terms can't be unified, `bindings` may be partially filled then.
pub(crate) fn unify(pattern: &TypeInfo, concrete: &TypeInfo, bindings: &mut Bindings) -> bool {
    match pattern {
        TypeInfo::Param(name) => match bindings.get(name) {
            Some(bound) => bound == concrete,
            None => {
                bindings.insert(name.clone(), concrete.clone());
                true
            }
        },
        TypeInfo::Named { name, args } => match concrete {
            TypeInfo::Named {
                name: concrete_name,
                args: concrete_args,
            } if name == concrete_name && args.len() == concrete_args.len() => args
                .iter()
                .zip(concrete_args.iter())
                .all(|(arg, concrete_arg)| unify(arg, concrete_arg, bindings)),
            _ => false,
        },
    }
}

/// Types of the same definition as `service` that `implementation` can be used as: itself and its bases
fn candidates(introspector: &dyn TypeIntrospector, service: &TypeInfo, implementation: &TypeInfo) -> Vec<TypeInfo> {
    let mut candidates = Vec::new();
    if implementation.same_definition(service) {
        candidates.push(implementation.clone());
    }
    candidates.extend(
        closed_bases(introspector, implementation)
            .into_iter()
            .filter(|base| base.same_definition(service)),
    );
    candidates
}

/// Closes the open (or partially closed) `implementation` for the closed `service`.
///
/// Unification goes through the implementation itself and all its bases of the same definition as the service,
/// so `Impl<T> : IService<T, String>` is closed to `Impl<Int32>` for `IService<Int32, String>`.
/// Returns `None` when the arguments can't be determined or the generic constraints don't hold.
#[must_use]
pub(crate) fn close_implementation(
    introspector: &dyn TypeIntrospector,
    service: &TypeInfo,
    implementation: &TypeInfo,
) -> Option<TypeInfo> {
    for candidate in candidates(introspector, service, implementation) {
        let mut bindings = Bindings::new();
        if !unify(&candidate, service, &mut bindings) {
            continue;
        }

        let closed = implementation.substitute(&bindings);
        if closed.is_open() {
            debug!(implementation = %implementation, service = %service, "Unresolvable type arguments");
            continue;
        }
        if !constraints_hold(introspector, &closed) {
            debug!(implementation = %closed, "Generic constraints don't hold");
            continue;
        }
        return Some(closed);
    }
    None
}

/// Checks an open generic registration: the implementation must be open, implement the service definition
/// and have each of its parameters determined by the service arguments
pub(crate) fn validate_open_generic(
    introspector: &dyn TypeIntrospector,
    service: &TypeInfo,
    implementation: &TypeInfo,
) -> Result<(), RegistrationErrorKind> {
    if !service.is_open() {
        return Err(RegistrationErrorKind::NotOpenGeneric { ty: service.clone() });
    }
    if !implementation.is_open() {
        return Err(RegistrationErrorKind::NotOpenGeneric {
            ty: implementation.clone(),
        });
    }
    let Some(descriptor) = introspector.describe(implementation) else {
        return Err(RegistrationErrorKind::UnknownType {
            ty: implementation.clone(),
        });
    };
    if !descriptor.kind.is_concrete() {
        return Err(RegistrationErrorKind::NotConcrete {
            implementation_type: implementation.clone(),
        });
    }

    let candidates = candidates(introspector, service, implementation);
    if candidates.is_empty() {
        return Err(RegistrationErrorKind::NotAssignable {
            service_type: service.clone(),
            implementation_type: implementation.clone(),
        });
    }

    let parameters = implementation.parameters();
    let resolvable = candidates.iter().any(|candidate| {
        let determined = candidate.parameters();
        parameters.iter().all(|parameter| determined.contains(parameter))
    });
    if resolvable {
        return Ok(());
    }

    let determined = candidates.iter().flat_map(TypeInfo::parameters).collect::<Vec<_>>();
    let missing = parameters
        .iter()
        .filter(|parameter| !determined.contains(parameter))
        .map(|parameter| parameter.as_ref())
        .collect::<Vec<_>>();

    Err(RegistrationErrorKind::UnresolvableTypeArguments {
        service_type: service.clone(),
        implementation_type: implementation.clone(),
        parameters: missing.join(", "),
    })
}
