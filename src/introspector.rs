use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use crate::{
    instance::Instance,
    types::{bind_definition, TypeInfo},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Interface,
    Abstract,
    Class,
    Struct,
}

impl TypeKind {
    /// Whether instances of the type can be created
    #[inline]
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        matches!(self, Self::Class | Self::Struct)
    }

    #[inline]
    #[must_use]
    pub const fn is_reference(self) -> bool {
        !matches!(self, Self::Struct)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenericConstraint {
    /// `where T : class`
    ReferenceType,
    /// `where T : struct`
    ValueType,
    /// `where T : new()`
    DefaultConstructor,
    /// `where T : Base`, the base may mention the other parameters of the definition
    Base(TypeInfo),
}

#[derive(Clone, Debug)]
pub struct GenericParameter {
    pub name: Arc<str>,
    pub constraints: Vec<GenericConstraint>,
}

#[derive(Clone, Debug)]
pub struct ParameterInfo {
    pub name: Arc<str>,
    /// In terms of the type definition, e.g. `IRepo<T>` for a constructor of `Service<T>`
    pub parameter_type: TypeInfo,
}

pub type Activator = Arc<dyn Fn(&TypeInfo, Vec<Instance>) -> anyhow::Result<Instance> + Send + Sync>;

/// A public constructor: its parameters and the callable that turns resolved arguments into an instance.
///
/// The activator receives the closed type being created and the arguments in parameter order.
#[derive(Clone)]
pub struct ConstructorInfo {
    pub parameters: Vec<ParameterInfo>,
    activator: Activator,
}

impl ConstructorInfo {
    #[inline]
    #[must_use]
    pub fn new(parameters: Vec<ParameterInfo>, activator: Activator) -> Self {
        Self { parameters, activator }
    }

    #[inline]
    pub(crate) fn activate(&self, ty: &TypeInfo, arguments: Vec<Instance>) -> anyhow::Result<Instance> {
        (self.activator)(ty, arguments)
    }
}

impl Debug for ConstructorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorInfo").field("parameters", &self.parameters).finish()
    }
}

/// Metadata of a type definition
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    /// `Repo<T>` for generic types, the type itself otherwise
    pub definition: TypeInfo,
    pub generic_parameters: Vec<GenericParameter>,
    /// Base types and implemented interfaces, in terms of the definition
    pub bases: Vec<TypeInfo>,
    pub constructors: Vec<ConstructorInfo>,
}

/// Type metadata capability used by the container in place of reflection
pub trait TypeIntrospector: Send + Sync + 'static {
    /// Describes the definition of `ty`, for `Repo<Int32>` it's the descriptor of `Repo<T>`
    fn describe(&self, ty: &TypeInfo) -> Option<Arc<TypeDescriptor>>;
}

impl<T: TypeIntrospector + ?Sized> TypeIntrospector for Arc<T> {
    #[inline]
    fn describe(&self, ty: &TypeInfo) -> Option<Arc<TypeDescriptor>> {
        (**self).describe(ty)
    }
}

/// Base types and interfaces of `ty`, transitively, with the arguments of `ty` substituted
#[must_use]
pub(crate) fn closed_bases(introspector: &dyn TypeIntrospector, ty: &TypeInfo) -> Vec<TypeInfo> {
    let mut bases: Vec<TypeInfo> = Vec::new();
    let mut pending = vec![ty.clone()];

    while let Some(current) = pending.pop() {
        let Some(descriptor) = introspector.describe(&current) else {
            continue;
        };
        let bindings = bind_definition(&descriptor.definition, &current);
        for base in &descriptor.bases {
            let base = base.substitute(&bindings);
            if base != *ty && !bases.contains(&base) {
                bases.push(base.clone());
                pending.push(base);
            }
        }
    }

    bases
}

/// Whether an instance of `source` can be used where `target` is expected
#[must_use]
pub(crate) fn is_assignable(introspector: &dyn TypeIntrospector, target: &TypeInfo, source: &TypeInfo) -> bool {
    target == source || closed_bases(introspector, source).contains(target)
}

#[must_use]
pub(crate) fn satisfies(introspector: &dyn TypeIntrospector, ty: &TypeInfo, constraint: &GenericConstraint) -> bool {
    match constraint {
        GenericConstraint::Base(base) => is_assignable(introspector, base, ty),
        GenericConstraint::ReferenceType | GenericConstraint::ValueType | GenericConstraint::DefaultConstructor => {
            let Some(descriptor) = introspector.describe(ty) else {
                return false;
            };
            match constraint {
                GenericConstraint::ReferenceType => descriptor.kind.is_reference(),
                GenericConstraint::ValueType => descriptor.kind == TypeKind::Struct,
                _ => {
                    descriptor.kind == TypeKind::Struct
                        || (descriptor.kind == TypeKind::Class
                            && descriptor.constructors.iter().any(|constructor| constructor.parameters.is_empty()))
                }
            }
        }
    }
}

/// Checks the constraints of the closed generic type `ty` against its arguments
#[must_use]
pub(crate) fn constraints_hold(introspector: &dyn TypeIntrospector, ty: &TypeInfo) -> bool {
    let Some(descriptor) = introspector.describe(ty) else {
        return false;
    };
    let bindings = bind_definition(&descriptor.definition, ty);

    descriptor.generic_parameters.iter().all(|parameter| {
        let Some(argument) = bindings.get(&parameter.name) else {
            return false;
        };
        parameter.constraints.iter().all(|constraint| {
            let constraint = match constraint {
                GenericConstraint::Base(base) => GenericConstraint::Base(base.substitute(&bindings)),
                other => other.clone(),
            };
            satisfies(introspector, argument, &constraint)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::{closed_bases, constraints_hold, is_assignable, GenericConstraint, TypeDescriptor};
    use crate::{catalog::TypeCatalog, instance::Instance, types::TypeInfo};

    fn t() -> TypeInfo {
        TypeInfo::param("T")
    }

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog
            .add(TypeDescriptor::interface(TypeInfo::generic("IService", [t(), TypeInfo::param("U")])))
            .add(TypeDescriptor::interface(TypeInfo::generic("IBase", [t()])))
            .add(
                TypeDescriptor::abstract_class(TypeInfo::generic("OpenGenericBase", [t()]))
                    .implements(TypeInfo::generic("IService", [t(), TypeInfo::named("String")])),
            )
            .add(
                TypeDescriptor::class(TypeInfo::generic("Derived", [t()]))
                    .implements(TypeInfo::generic("OpenGenericBase", [TypeInfo::generic("IBase", [t()])]))
                    .default_constructor(|_, _| Ok(Instance::new(()))),
            )
            .add(
                TypeDescriptor::class(TypeInfo::generic("StructOnly", [t()]))
                    .constraint("T", GenericConstraint::ValueType)
                    .default_constructor(|_, _| Ok(Instance::new(()))),
            )
            .add(TypeDescriptor::class(TypeInfo::named("Plain")).default_constructor(|_, _| Ok(Instance::new(()))));
        catalog
    }

    #[test]
    fn test_closed_bases() {
        let catalog = catalog();
        let derived = TypeInfo::generic("Derived", [TypeInfo::named("Int32")]);

        let bases = closed_bases(&catalog, &derived);
        let base_of_base = TypeInfo::generic(
            "IService",
            [TypeInfo::generic("IBase", [TypeInfo::named("Int32")]), TypeInfo::named("String")],
        );

        assert!(bases.contains(&base_of_base));
        assert!(is_assignable(&catalog, &base_of_base, &derived));
        assert!(!is_assignable(&catalog, &TypeInfo::named("Plain"), &derived));
    }

    #[test]
    fn test_constraints() {
        let catalog = catalog();

        assert!(constraints_hold(&catalog, &TypeInfo::generic("StructOnly", [TypeInfo::named("Int32")])));
        assert!(!constraints_hold(&catalog, &TypeInfo::generic("StructOnly", [TypeInfo::named("Plain")])));
        assert!(!constraints_hold(&catalog, &TypeInfo::generic("StructOnly", [TypeInfo::named("String")])));
    }
}
