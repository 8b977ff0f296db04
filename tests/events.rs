mod common;

use common::{describe, named, node, Node};
use parking_lot::Mutex;
use sinew::{Container, Instance, Lifestyle, Plan, ResolveErrorKind, TypeCatalog, TypeDescriptor, TypeInfo};
use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc,
};
use tracing_test::traced_test;

fn catalog() -> TypeCatalog {
    TypeCatalog::new()
        .with(TypeDescriptor::interface(named("IRepo")))
        .with(TypeDescriptor::interface(named("ILogger")))
        .with(TypeDescriptor::class(named("SqlRepo")).implements(named("IRepo")).default_constructor(node))
        .with(
            TypeDescriptor::class(named("Both"))
                .implements(named("IRepo"))
                .implements(named("ILogger"))
                .default_constructor(node),
        )
        .with(TypeDescriptor::class(named("Consumer")).constructor([("repo", named("IRepo"))], node))
        .with(TypeDescriptor::class(named("Plain")).default_constructor(node))
}

#[test]
#[traced_test]
fn test_unregistered_type_handled_once() {
    let container = Container::new(catalog());
    let calls = Arc::new(AtomicU8::new(0));
    container
        .on_unregistered_type({
            let calls = calls.clone();
            move |args| {
                calls.fetch_add(1, Ordering::SeqCst);
                if args.service_type() == &named("IRepo") {
                    let registration = Lifestyle::Singleton
                        .create_registration(named("SqlRepo"), args.container())
                        .unwrap();
                    args.register(registration);
                }
            }
        })
        .unwrap();

    let first = container.get_instance(&named("IRepo")).unwrap();
    let second = container.get_instance(&named("IRepo")).unwrap();
    assert_eq!(describe(&first), "SqlRepo");
    assert!(first.ptr_eq(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let consumer = container.get_instance(&named("Consumer")).unwrap();
    assert_eq!(describe(&consumer), "Consumer(SqlRepo)");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
#[traced_test]
fn test_unregistered_type_before_automatic_creation() {
    let container = Container::new(catalog());
    container
        .on_unregistered_type(|args| {
            if args.service_type() == &named("Plain") {
                args.register_factory(Lifestyle::Transient, |_| Ok(Instance::new("from handler")));
            }
        })
        .unwrap();

    assert_eq!(*container.get::<&str>(&named("Plain")).unwrap(), "from handler");
}

#[test]
#[traced_test]
fn test_ambiguous_unregistered_type() {
    let container = Container::new(catalog());
    let seen_handled = Arc::new(AtomicBool::new(false));
    container
        .on_unregistered_type(|args| args.register_factory(Lifestyle::Transient, |_| Ok(Instance::new("first"))))
        .unwrap();
    container
        .on_unregistered_type({
            let seen_handled = seen_handled.clone();
            move |args| {
                seen_handled.store(args.handled(), Ordering::SeqCst);
                args.register_factory(Lifestyle::Transient, |_| Ok(Instance::new("second")));
            }
        })
        .unwrap();

    for _ in 0..2 {
        assert!(matches!(
            container.get_instance(&named("IRepo")),
            Err(ResolveErrorKind::AmbiguousUnregisteredType { service_type }) if service_type == named("IRepo")
        ));
    }
    assert!(seen_handled.load(Ordering::SeqCst));
}

#[test]
#[traced_test]
fn test_unregistered_type_handler_resolving_itself() {
    let container = Container::new(catalog());
    let calls = Arc::new(AtomicU8::new(0));
    let cyclic = Arc::new(AtomicBool::new(false));
    container
        .on_unregistered_type({
            let calls = calls.clone();
            let cyclic = cyclic.clone();
            move |args| {
                if args.service_type() != &named("IRepo") {
                    return;
                }
                calls.fetch_add(1, Ordering::SeqCst);
                let result = args.container().get_instance(&named("IRepo"));
                cyclic.store(
                    matches!(
                        result,
                        Err(ResolveErrorKind::CyclicDependency { implementation_type }) if implementation_type == named("IRepo")
                    ),
                    Ordering::SeqCst,
                );
            }
        })
        .unwrap();

    for _ in 0..2 {
        assert!(matches!(
            container.get_instance(&named("IRepo")),
            Err(ResolveErrorKind::NotRegistered { service_type }) if service_type == named("IRepo")
        ));
    }
    assert!(cyclic.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_unregistered_type_handler_resolving_dependent() {
    let container = Container::new(catalog());
    let cyclic = Arc::new(AtomicBool::new(false));
    container
        .on_unregistered_type({
            let cyclic = cyclic.clone();
            move |args| {
                if args.service_type() != &named("IRepo") {
                    return;
                }
                let result = args.container().get_instance(&named("Consumer"));
                cyclic.store(matches!(result, Err(ResolveErrorKind::CyclicDependency { .. })), Ordering::SeqCst);
                let registration = Lifestyle::Transient
                    .create_registration(named("SqlRepo"), args.container())
                    .unwrap();
                args.register(registration);
            }
        })
        .unwrap();

    assert_eq!(describe(&container.get_instance(&named("IRepo")).unwrap()), "SqlRepo");
    assert!(cyclic.load(Ordering::SeqCst));
}

#[test]
#[traced_test]
fn test_expression_building_once_per_registration() {
    let container = Container::new(catalog());
    let built = Arc::new(Mutex::new(Vec::new()));
    container
        .on_expression_building({
            let built = built.clone();
            move |args| built.lock().push(args.implementation_type().clone())
        })
        .unwrap();
    let registration = Lifestyle::Transient.create_registration(named("Both"), &container).unwrap();
    container.add_registration(named("IRepo"), registration.clone()).unwrap();
    container.add_registration(named("ILogger"), registration).unwrap();

    for _ in 0..3 {
        container.get_instance(&named("IRepo")).unwrap();
        container.get_instance(&named("ILogger")).unwrap();
    }
    assert_eq!(*built.lock(), [named("Both")]);
}

#[test]
#[traced_test]
fn test_expression_building_replaces_plan_before_lifestyle() {
    let container = Container::new(catalog());
    let calls = Arc::new(AtomicU8::new(0));
    container
        .on_expression_building({
            let calls = calls.clone();
            move |args| {
                assert_eq!(args.lifestyle().name(), "Singleton");
                let inner = args.plan().clone();
                let calls = calls.clone();
                args.set_plan(Plan::new(move |resolution| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Instance::new(Node {
                        ty: named("Intercepted"),
                        deps: vec![inner.call(resolution)?],
                    }))
                }));
            }
        })
        .unwrap();
    container.register_singleton(named("IRepo"), named("SqlRepo")).unwrap();

    let first = container.get_instance(&named("IRepo")).unwrap();
    assert_eq!(describe(&first), "Intercepted(SqlRepo)");
    assert!(first.ptr_eq(&container.get_instance(&named("IRepo")).unwrap()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_expression_built_once_per_service() {
    let container = Container::new(catalog());
    let built = Arc::new(Mutex::new(Vec::new()));
    container
        .on_expression_built({
            let built = built.clone();
            move |args| {
                built
                    .lock()
                    .push((args.service_type().clone(), args.implementation_type().clone()));
                let inner = args.plan().clone();
                args.set_plan(Plan::new(move |resolution| {
                    Ok(Instance::new(Node {
                        ty: named("Built"),
                        deps: vec![inner.call(resolution)?],
                    }))
                }));
            }
        })
        .unwrap();
    let registration = Lifestyle::Singleton.create_registration(named("Both"), &container).unwrap();
    container.add_registration(named("IRepo"), registration.clone()).unwrap();
    container.add_registration(named("ILogger"), registration).unwrap();

    let repo = container.get_instance(&named("IRepo")).unwrap();
    container.get_instance(&named("IRepo")).unwrap();
    let logger = container.get_instance(&named("ILogger")).unwrap();

    assert_eq!(describe(&repo), "Built(Both)");
    assert!(!repo.ptr_eq(&logger));
    assert!(common::dep(&repo, 0).ptr_eq(&common::dep(&logger, 0)));
    assert_eq!(
        *built.lock(),
        [(named("IRepo"), named("Both")), (named("ILogger"), named("Both"))]
    );
}

#[test]
#[traced_test]
fn test_instance_created_on_every_creation() {
    let container = Container::new(catalog());
    let created = Arc::new(Mutex::new(Vec::new()));
    container
        .on_instance_created({
            let created = created.clone();
            move |args| {
                assert!(args.instance.downcast_ref::<Node>().is_some());
                created.lock().push(args.implementation_type.to_string());
            }
        })
        .unwrap();
    container.register_singleton(named("IRepo"), named("SqlRepo")).unwrap();

    container.get_instance(&named("Consumer")).unwrap();
    container.get_instance(&named("Consumer")).unwrap();
    container.get_instance(&named("IRepo")).unwrap();

    assert_eq!(*created.lock(), ["SqlRepo", "Consumer", "Consumer"]);
}

#[test]
#[traced_test]
fn test_instance_created_for_factories() {
    let container = Container::new(catalog());
    let created = Arc::new(Mutex::new(Vec::<TypeInfo>::new()));
    container
        .on_instance_created({
            let created = created.clone();
            move |args| created.lock().push(args.implementation_type.clone())
        })
        .unwrap();
    container
        .register_factory(named("ILogger"), Lifestyle::Transient, |_| {
            Ok(Instance::new(Node {
                ty: named("FactoryLogger"),
                deps: Vec::new(),
            }))
        })
        .unwrap();

    container.get_instance(&named("ILogger")).unwrap();
    container.get_instance(&named("ILogger")).unwrap();
    assert_eq!(*created.lock(), [named("ILogger"), named("ILogger")]);
}
