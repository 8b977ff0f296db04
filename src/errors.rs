mod registration;
mod resolve;
mod scope;

pub use registration::RegistrationErrorKind;
pub use resolve::ResolveErrorKind;
pub use scope::ScopeErrorKind;

use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

/// Error returned by user code (activators, factories, disposers), shared so it can be cached and replayed
#[derive(Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    #[inline]
    #[must_use]
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    #[inline]
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn downcast_ref<E: Display + Debug + Send + Sync + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref()
    }
}

impl Display for SharedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&*self.0, f)
    }
}

impl Debug for SharedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

impl Error for SharedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}
