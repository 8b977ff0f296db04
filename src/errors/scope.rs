use crate::errors::SharedError;

#[derive(thiserror::Error, Debug, Clone)]
pub enum ScopeErrorKind {
    #[error(
        "Scope {scope_id} is being disposed from a thread other than the one that began it. \
        Scopes can only be ended on their own thread"
    )]
    WrongThread { scope_id: u64 },
    #[error("There is no active scope on the current thread. Call `Container::begin_scope` first")]
    NoActiveScope,
    #[error("Disposing the scope failed for {failures} instance(s), the last error: {source}")]
    Disposal { failures: usize, source: SharedError },
}
