#![allow(dead_code)]

use parking_lot::Mutex;
use sinew::{Disposable, Factory, Instance, TypeInfo};
use std::sync::Arc;

/// Instance of a described type, keeps its constructor arguments
pub struct Node {
    pub ty: TypeInfo,
    pub deps: Vec<Instance>,
}

pub fn node(ty: &TypeInfo, deps: Vec<Instance>) -> anyhow::Result<Instance> {
    Ok(Instance::new(Node { ty: ty.clone(), deps }))
}

/// Renders the object graph of the instance, e.g. `D2(D1(Base))`
pub fn describe(instance: &Instance) -> String {
    if let Some(node) = instance.downcast_ref::<Node>() {
        if node.deps.is_empty() {
            return node.ty.to_string();
        }
        let deps = node.deps.iter().map(describe).collect::<Vec<_>>();
        return format!("{}({})", node.ty, deps.join(", "));
    }
    if let Some(factory) = instance.downcast_ref::<Factory>() {
        return format!("{factory:?}");
    }
    "?".to_owned()
}

pub fn dep(instance: &Instance, index: usize) -> Instance {
    instance.downcast_ref::<Node>().unwrap().deps[index].clone()
}

pub fn named(name: &str) -> TypeInfo {
    TypeInfo::named(name)
}

pub fn t() -> TypeInfo {
    TypeInfo::param("T")
}

pub fn int() -> TypeInfo {
    TypeInfo::named("Int32")
}

pub type Log = Arc<Mutex<Vec<String>>>;

pub struct Tracked {
    pub name: String,
    pub log: Log,
}

impl Disposable for Tracked {
    fn dispose(&self) -> anyhow::Result<()> {
        self.log.lock().push(self.name.clone());
        Ok(())
    }
}

/// Activator creating disposable instances that log their type name when disposed
pub fn tracked(log: &Log) -> impl Fn(&TypeInfo, Vec<Instance>) -> anyhow::Result<Instance> + Send + Sync + 'static {
    let log = log.clone();
    move |ty, _| {
        Ok(Instance::disposable(Tracked {
            name: ty.to_string(),
            log: log.clone(),
        }))
    }
}
