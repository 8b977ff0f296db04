use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

const FUNC: &str = "Func";
const ENUMERABLE: &str = "IEnumerable";

/// A type term.
///
/// Either a named type with generic arguments (`IRepo<Int32>`, `SqlRepo`) or a generic parameter (`T`).
/// A generic type definition is a named type whose arguments are all parameters (`IRepo<T>`),
/// a closed type doesn't contain any parameter, a partially closed one mixes both (`Impl<Int32, T>`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeInfo {
    Param(Arc<str>),
    Named { name: Arc<str>, args: Arc<[TypeInfo]> },
}

/// Generic parameter name -> bound type
pub type Bindings = BTreeMap<Arc<str>, TypeInfo>;

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self::Named {
            name: name.into(),
            args: Arc::new([]),
        }
    }

    #[inline]
    #[must_use]
    pub fn generic(name: &str, args: impl IntoIterator<Item = TypeInfo>) -> Self {
        Self::Named {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn param(name: &str) -> Self {
        Self::Param(name.into())
    }

    /// `Func<T>`, a factory for `T`
    #[inline]
    #[must_use]
    pub fn func(ty: TypeInfo) -> Self {
        Self::generic(FUNC, [ty])
    }

    /// `IEnumerable<T>`, a collection of `T`
    #[inline]
    #[must_use]
    pub fn enumerable(ty: TypeInfo) -> Self {
        Self::generic(ENUMERABLE, [ty])
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Param(name) | Self::Named { name, .. } => name,
        }
    }

    #[must_use]
    pub fn args(&self) -> &[TypeInfo] {
        match self {
            Self::Param(_) => &[],
            Self::Named { args, .. } => args,
        }
    }

    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args().len()
    }

    #[inline]
    #[must_use]
    pub fn is_param(&self) -> bool {
        matches!(self, Self::Param(_))
    }

    /// Whether any generic parameter appears in the term
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            Self::Param(_) => true,
            Self::Named { args, .. } => args.iter().any(TypeInfo::is_open),
        }
    }

    /// Whether the term is a generic type definition, like `IRepo<T>`
    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        match self {
            Self::Param(_) => false,
            Self::Named { args, .. } => !args.is_empty() && args.iter().all(TypeInfo::is_param),
        }
    }

    /// Types are of the same generic definition if their names and arities are equal,
    /// so `IRepo<T>` and `IRepo<Int32>` are, but `IRepo<T>` and `IRepo<T, U>` aren't.
    #[must_use]
    pub fn same_definition(&self, other: &TypeInfo) -> bool {
        match (self, other) {
            (Self::Named { name, args }, Self::Named { name: other_name, args: other_args }) => {
                name == other_name && args.len() == other_args.len()
            }
            _ => false,
        }
    }

    #[must_use]
    pub(crate) fn definition_key(&self) -> (Arc<str>, usize) {
        match self {
            Self::Param(name) => (name.clone(), 0),
            Self::Named { name, args } => (name.clone(), args.len()),
        }
    }

    /// Generic parameters in order of first appearance
    #[must_use]
    pub fn parameters(&self) -> Vec<Arc<str>> {
        fn collect(ty: &TypeInfo, out: &mut Vec<Arc<str>>) {
            match ty {
                TypeInfo::Param(name) => {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
                TypeInfo::Named { args, .. } => args.iter().for_each(|arg| collect(arg, out)),
            }
        }

        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }

    /// Replaces bound parameters, unbound ones stay as they are
    #[must_use]
    pub fn substitute(&self, bindings: &Bindings) -> TypeInfo {
        match self {
            Self::Param(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Self::Named { name, args } => {
                if args.is_empty() {
                    return self.clone();
                }
                Self::Named {
                    name: name.clone(),
                    args: args.iter().map(|arg| arg.substitute(bindings)).collect(),
                }
            }
        }
    }

    /// Element type of `IEnumerable<T>`
    #[must_use]
    pub fn enumerable_element(&self) -> Option<&TypeInfo> {
        self.single_arg_of(ENUMERABLE)
    }

    /// Product type of `Func<T>`
    #[must_use]
    pub fn func_product(&self) -> Option<&TypeInfo> {
        self.single_arg_of(FUNC)
    }

    fn single_arg_of(&self, expected: &str) -> Option<&TypeInfo> {
        match self {
            Self::Named { name, args } if &**name == expected && args.len() == 1 => args.first(),
            _ => None,
        }
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(name) => f.write_str(name),
            Self::Named { name, args } => {
                f.write_str(name)?;
                if args.is_empty() {
                    return Ok(());
                }
                f.write_str("<")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    Display::fmt(arg, f)?;
                }
                f.write_str(">")
            }
        }
    }
}

impl Debug for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Binds the definition's parameters to the arguments of `ty`.
/// For `definition = Repo<T>` and `ty = Repo<Int32>` it's `T -> Int32`.
#[must_use]
pub(crate) fn bind_definition(definition: &TypeInfo, ty: &TypeInfo) -> Bindings {
    definition
        .args()
        .iter()
        .zip(ty.args())
        .filter_map(|(param, arg)| match param {
            TypeInfo::Param(name) => Some((name.clone(), arg.clone())),
            TypeInfo::Named { .. } => None,
        })
        .collect()
}
