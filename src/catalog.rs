use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use crate::{
    instance::Instance,
    introspector::{ConstructorInfo, GenericConstraint, GenericParameter, ParameterInfo, TypeDescriptor, TypeIntrospector, TypeKind},
    types::TypeInfo,
};

/// In-memory [`TypeIntrospector`], types are declared by the caller.
///
/// `Int32`, `Int64` and `Boolean` (structs) and `String` (a class without public constructors) are preloaded by [`TypeCatalog::new`].
#[derive(Clone, Default)]
pub struct TypeCatalog {
    types: BTreeMap<(Arc<str>, usize), Arc<TypeDescriptor>>,
}

impl TypeCatalog {
    #[must_use]
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        catalog
            .add(TypeDescriptor::structure(TypeInfo::named("Int32")))
            .add(TypeDescriptor::structure(TypeInfo::named("Int64")))
            .add(TypeDescriptor::structure(TypeInfo::named("Boolean")))
            .add(TypeDescriptor::class(TypeInfo::named("String")));
        catalog
    }

    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds the descriptor, replacing a previous one of the same definition
    pub fn add(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        debug!(definition = %descriptor.definition, "Type described");
        self.types.insert(descriptor.definition.definition_key(), Arc::new(descriptor));
        self
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, descriptor: TypeDescriptor) -> Self {
        self.add(descriptor);
        self
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeIntrospector for TypeCatalog {
    fn describe(&self, ty: &TypeInfo) -> Option<Arc<TypeDescriptor>> {
        if ty.is_param() {
            return None;
        }
        self.types.get(&ty.definition_key()).cloned()
    }
}

impl TypeDescriptor {
    /// Descriptor without bases and constructors, generic parameters are taken from the definition
    #[must_use]
    pub fn new(kind: TypeKind, definition: TypeInfo) -> Self {
        let generic_parameters = definition
            .parameters()
            .into_iter()
            .map(|name| GenericParameter {
                name,
                constraints: Vec::new(),
            })
            .collect();

        Self {
            kind,
            definition,
            generic_parameters,
            bases: Vec::new(),
            constructors: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn interface(definition: TypeInfo) -> Self {
        Self::new(TypeKind::Interface, definition)
    }

    #[inline]
    #[must_use]
    pub fn abstract_class(definition: TypeInfo) -> Self {
        Self::new(TypeKind::Abstract, definition)
    }

    #[inline]
    #[must_use]
    pub fn class(definition: TypeInfo) -> Self {
        Self::new(TypeKind::Class, definition)
    }

    #[inline]
    #[must_use]
    pub fn structure(definition: TypeInfo) -> Self {
        Self::new(TypeKind::Struct, definition)
    }

    /// Adds a base type or an implemented interface
    #[must_use]
    pub fn implements(mut self, base: TypeInfo) -> Self {
        self.bases.push(base);
        self
    }

    /// Adds a constraint to the generic parameter, unknown parameters are ignored
    #[must_use]
    pub fn constraint(mut self, parameter: &str, constraint: GenericConstraint) -> Self {
        if let Some(parameter) = self
            .generic_parameters
            .iter_mut()
            .find(|generic_parameter| &*generic_parameter.name == parameter)
        {
            parameter.constraints.push(constraint);
        }
        self
    }

    #[must_use]
    pub fn constructor<'a, F>(mut self, parameters: impl IntoIterator<Item = (&'a str, TypeInfo)>, activator: F) -> Self
    where
        F: Fn(&TypeInfo, Vec<Instance>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        let parameters = parameters
            .into_iter()
            .map(|(name, parameter_type)| ParameterInfo {
                name: name.into(),
                parameter_type,
            })
            .collect();
        self.constructors.push(ConstructorInfo::new(parameters, Arc::new(activator)));
        self
    }

    /// Adds a parameterless constructor
    #[must_use]
    pub fn default_constructor<F>(mut self, activator: F) -> Self
    where
        F: Fn(&TypeInfo, Vec<Instance>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorInfo::new(Vec::new(), Arc::new(activator)));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::TypeCatalog;
    use crate::{
        instance::Instance,
        introspector::{GenericConstraint, TypeDescriptor, TypeIntrospector as _, TypeKind},
        types::TypeInfo,
    };

    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_describe_by_definition() {
        let catalog = TypeCatalog::new().with(
            TypeDescriptor::class(TypeInfo::generic("Repo", [TypeInfo::param("T")]))
                .implements(TypeInfo::generic("IRepo", [TypeInfo::param("T")]))
                .constraint("T", GenericConstraint::ReferenceType)
                .constructor([("name", TypeInfo::named("String"))], |_, _| Ok(Instance::new(()))),
        );

        let descriptor = catalog.describe(&TypeInfo::generic("Repo", [TypeInfo::named("String")])).unwrap();
        assert_eq!(descriptor.kind, TypeKind::Class);
        assert_eq!(descriptor.generic_parameters.len(), 1);
        assert_eq!(descriptor.generic_parameters[0].constraints, [GenericConstraint::ReferenceType]);
        assert_eq!(descriptor.constructors[0].parameters[0].name.as_ref(), "name");

        assert!(catalog.describe(&TypeInfo::named("Repo")).is_none());
        assert!(catalog.describe(&TypeInfo::param("T")).is_none());
    }

    #[test]
    #[traced_test]
    fn test_primitives() {
        let catalog = TypeCatalog::new();

        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.describe(&TypeInfo::named("Int32")).unwrap().kind, TypeKind::Struct);
        assert!(catalog.describe(&TypeInfo::named("String")).unwrap().constructors.is_empty());
        assert!(TypeCatalog::empty().is_empty());
    }
}
