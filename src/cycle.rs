use std::cell::RefCell;
use tracing::debug;

use crate::{errors::ResolveErrorKind, types::TypeInfo};

/// A registration, producer or service lookup on the stack of the current thread
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Its plan is being built
    Building(u64),
    /// One of its cache slots is being filled
    Caching(u64),
    /// Its instance is being created
    Creating(u64),
    /// A producer for the service is being looked for
    Lookup(TypeInfo),
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Keeps the frame on the stack of the current thread until dropped
#[must_use]
pub(crate) struct CycleGuard {
    frame: Frame,
}

impl CycleGuard {
    /// Pushes the frame, fails if it's already on the stack
    pub(crate) fn enter(frame: Frame, implementation_type: &TypeInfo) -> Result<Self, ResolveErrorKind> {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&frame) {
                debug!(?frame, depth = stack.len(), "Cycle detected");
                return Err(ResolveErrorKind::CyclicDependency {
                    implementation_type: implementation_type.clone(),
                });
            }
            stack.push(frame.clone());
            Ok(Self { frame })
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(index) = stack.iter().rposition(|frame| *frame == self.frame) {
                stack.remove(index);
            }
        });
    }
}

#[cfg(test)]
pub(crate) fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::{depth, CycleGuard, Frame};
    use crate::{errors::ResolveErrorKind, types::TypeInfo};

    use std::thread;

    #[test]
    fn test_reentry() {
        let ty = TypeInfo::named("A");
        {
            let _first = CycleGuard::enter(Frame::Building(1), &ty).unwrap();
            let _other = CycleGuard::enter(Frame::Creating(1), &ty).unwrap();

            assert!(matches!(
                CycleGuard::enter(Frame::Building(1), &ty),
                Err(ResolveErrorKind::CyclicDependency { implementation_type }) if implementation_type == ty
            ));
            assert!(CycleGuard::enter(Frame::Caching(1), &ty).is_ok());
            assert_eq!(depth(), 2);

            let _lookup = CycleGuard::enter(Frame::Lookup(ty.clone()), &ty).unwrap();
            assert!(matches!(
                CycleGuard::enter(Frame::Lookup(TypeInfo::named("A")), &ty),
                Err(ResolveErrorKind::CyclicDependency { .. })
            ));
            assert!(CycleGuard::enter(Frame::Lookup(TypeInfo::named("B")), &ty).is_ok());
            assert_eq!(depth(), 3);
        }
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_per_thread() {
        let ty = TypeInfo::named("A");
        let _guard = CycleGuard::enter(Frame::Building(7), &ty).unwrap();

        thread::spawn(move || {
            let _guard = CycleGuard::enter(Frame::Building(7), &ty).unwrap();
        })
        .join()
        .unwrap();
    }
}
