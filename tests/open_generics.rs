mod common;

use common::{describe, int, named, node, t};
use sinew::{
    Container, GenericConstraint, Lifestyle, RegistrationErrorKind, ResolveErrorKind, TypeCatalog, TypeDescriptor,
    TypeInfo,
};
use tracing_test::traced_test;

fn handler(ty: TypeInfo) -> TypeInfo {
    TypeInfo::generic("IHandler", [ty])
}

fn long() -> TypeInfo {
    named("Int64")
}

fn catalog() -> TypeCatalog {
    let u = TypeInfo::param("U");
    TypeCatalog::new()
        .with(TypeDescriptor::interface(handler(t())))
        .with(TypeDescriptor::interface(TypeInfo::generic("IPair", [t(), u.clone()])))
        .with(TypeDescriptor::interface(TypeInfo::generic("IBase", [t()])))
        .with(TypeDescriptor::class(named("Customer")).default_constructor(node))
        .with(
            TypeDescriptor::class(TypeInfo::generic("StructHandler", [t()]))
                .implements(handler(t()))
                .constraint("T", GenericConstraint::ValueType)
                .default_constructor(node),
        )
        .with(
            TypeDescriptor::class(TypeInfo::generic("ImplA", [t()]))
                .implements(handler(t()))
                .default_constructor(node),
        )
        .with(
            TypeDescriptor::class(TypeInfo::generic("ImplB", [t()]))
                .implements(handler(t()))
                .default_constructor(node),
        )
        .with(
            TypeDescriptor::class(TypeInfo::generic("Extra", [t(), u.clone()]))
                .implements(handler(t()))
                .default_constructor(node),
        )
        .with(
            TypeDescriptor::class(TypeInfo::generic("Pair", [t(), u.clone()]))
                .implements(TypeInfo::generic("IPair", [t(), u.clone()]))
                .default_constructor(node),
        )
        .with(
            TypeDescriptor::abstract_class(TypeInfo::generic("PairBase", [t()]))
                .implements(TypeInfo::generic("IPair", [t(), named("String")])),
        )
        .with(
            TypeDescriptor::class(TypeInfo::generic("Nested", [t()]))
                .implements(TypeInfo::generic("PairBase", [TypeInfo::generic("IBase", [t()])]))
                .default_constructor(node),
        )
        .with(
            TypeDescriptor::class(TypeInfo::generic("Consumer", [t()]))
                .constructor([("handler", handler(t()))], node),
        )
}

#[test]
#[traced_test]
fn test_constraint_gating() {
    let container = Container::new(catalog());
    container
        .register_open_generic(handler(t()), TypeInfo::generic("StructHandler", [t()]), Lifestyle::Transient)
        .unwrap();

    let producer = container.get_registration(&handler(int())).unwrap().unwrap();
    assert_eq!(
        producer.implementation_type(),
        &TypeInfo::generic("StructHandler", [int()])
    );
    assert!(container.get_registration(&handler(named("Customer"))).unwrap().is_none());
    assert!(matches!(
        container.get_instance(&handler(named("Customer"))),
        Err(ResolveErrorKind::NotRegistered { .. })
    ));
}

#[test]
#[traced_test]
fn test_predicate_disambiguation() {
    let container = Container::new(catalog());
    container
        .register_open_generic_when(handler(t()), TypeInfo::generic("ImplA", [t()]), Lifestyle::Transient, |context| {
            context.service_type == handler(int())
        })
        .unwrap();
    container
        .register_open_generic_when(handler(t()), TypeInfo::generic("ImplB", [t()]), Lifestyle::Transient, |context| {
            context.service_type == handler(long())
        })
        .unwrap();

    assert_eq!(describe(&container.get_instance(&handler(int())).unwrap()), "ImplA<Int32>");
    assert_eq!(describe(&container.get_instance(&handler(long())).unwrap()), "ImplB<Int64>");
    assert!(container.get_registration(&handler(named("Boolean"))).unwrap().is_none());
}

#[test]
#[traced_test]
fn test_ambiguous_predicates() {
    let container = Container::new(catalog());
    container
        .register_open_generic_when(handler(t()), TypeInfo::generic("ImplA", [t()]), Lifestyle::Transient, |_| true)
        .unwrap();
    container
        .register_open_generic_when(handler(t()), TypeInfo::generic("ImplB", [t()]), Lifestyle::Transient, |_| true)
        .unwrap();

    for _ in 0..2 {
        assert!(matches!(
            container.get_instance(&handler(int())),
            Err(ResolveErrorKind::AmbiguousOpenGeneric { first, second, .. })
                if first == TypeInfo::generic("ImplA", [int()]) && second == TypeInfo::generic("ImplB", [int()])
        ));
    }
}

#[test]
#[traced_test]
fn test_first_unconditional_wins() {
    let container = Container::new(catalog());
    container
        .register_open_generic(handler(t()), TypeInfo::generic("ImplA", [t()]), Lifestyle::Transient)
        .unwrap();
    container
        .register_open_generic(handler(t()), TypeInfo::generic("ImplB", [t()]), Lifestyle::Transient)
        .unwrap();

    assert_eq!(describe(&container.get_instance(&handler(int())).unwrap()), "ImplA<Int32>");
}

#[test]
#[traced_test]
fn test_fallback_with_handled() {
    let container = Container::new(catalog());
    container
        .register_open_generic_when(handler(t()), TypeInfo::generic("ImplA", [t()]), Lifestyle::Transient, |context| {
            context.service_type == handler(int())
        })
        .unwrap();
    container
        .register_open_generic_when(handler(t()), TypeInfo::generic("ImplB", [t()]), Lifestyle::Transient, |context| {
            !context.handled
        })
        .unwrap();

    assert_eq!(describe(&container.get_instance(&handler(int())).unwrap()), "ImplA<Int32>");
    assert_eq!(describe(&container.get_instance(&handler(long())).unwrap()), "ImplB<Int64>");
}

#[test]
#[traced_test]
fn test_singleton_per_closed_type() {
    let container = Container::new(catalog());
    container
        .register_open_generic(handler(t()), TypeInfo::generic("ImplA", [t()]), Lifestyle::Singleton)
        .unwrap();

    let first = container.get_instance(&handler(int())).unwrap();
    assert!(first.ptr_eq(&container.get_instance(&handler(int())).unwrap()));
    assert!(!first.ptr_eq(&container.get_instance(&handler(long())).unwrap()));
}

#[test]
#[traced_test]
fn test_partially_closed_implementation() {
    let container = Container::new(catalog());
    let pair = TypeInfo::generic("IPair", [t(), TypeInfo::param("U")]);
    container
        .register_open_generic(pair, TypeInfo::generic("Pair", [int(), TypeInfo::param("U")]), Lifestyle::Transient)
        .unwrap();

    let instance = container
        .get_instance(&TypeInfo::generic("IPair", [int(), named("String")]))
        .unwrap();
    assert_eq!(describe(&instance), "Pair<Int32, String>");
    assert!(container
        .get_registration(&TypeInfo::generic("IPair", [long(), named("String")]))
        .unwrap()
        .is_none());
}

#[test]
#[traced_test]
fn test_indirect_unification() {
    let container = Container::new(catalog());
    let pair = TypeInfo::generic("IPair", [t(), TypeInfo::param("U")]);
    container
        .register_open_generic(pair, TypeInfo::generic("Nested", [t()]), Lifestyle::Transient)
        .unwrap();

    let request = TypeInfo::generic("IPair", [TypeInfo::generic("IBase", [int()]), named("String")]);
    assert_eq!(describe(&container.get_instance(&request).unwrap()), "Nested<Int32>");
    assert!(container
        .get_registration(&TypeInfo::generic("IPair", [int(), named("String")]))
        .unwrap()
        .is_none());
}

#[test]
#[traced_test]
fn test_closed_consumer_of_open_generic() {
    let container = Container::new(catalog());
    container
        .register_open_generic(handler(t()), TypeInfo::generic("ImplA", [t()]), Lifestyle::Transient)
        .unwrap();

    let consumer = container
        .get_instance(&TypeInfo::generic("Consumer", [long()]))
        .unwrap();
    assert_eq!(describe(&consumer), "Consumer<Int64>(ImplA<Int64>)");
}

#[test]
#[traced_test]
fn test_invalid_open_generic_registrations() {
    let container = Container::new(catalog());

    assert!(matches!(
        container.register_open_generic(handler(t()), TypeInfo::generic("Extra", [t(), TypeInfo::param("U")]), Lifestyle::Transient),
        Err(RegistrationErrorKind::UnresolvableTypeArguments { parameters, .. }) if parameters == "U"
    ));
    assert!(matches!(
        container.register_open_generic(handler(int()), TypeInfo::generic("ImplA", [t()]), Lifestyle::Transient),
        Err(RegistrationErrorKind::NotOpenGeneric { .. })
    ));
    assert!(matches!(
        container.register_open_generic(handler(t()), named("Customer"), Lifestyle::Transient),
        Err(RegistrationErrorKind::NotOpenGeneric { .. })
    ));
    assert!(matches!(
        container.register_open_generic(
            TypeInfo::generic("IBase", [t()]),
            TypeInfo::generic("ImplA", [t()]),
            Lifestyle::Transient
        ),
        Err(RegistrationErrorKind::NotAssignable { .. })
    ));
    assert!(matches!(
        container.register(handler(int()), TypeInfo::generic("ImplA", [t()])),
        Err(RegistrationErrorKind::OpenGenericImplementation { .. })
    ));
}
