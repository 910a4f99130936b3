//! Thread local storage of the scope the running task belongs to.

use std::cell::RefCell;
use std::sync::Arc;

use super::Scope;

thread_local! {
    /// Each thread belongs to at most one scope at a time.
    static SCOPE: RefCell<Option<Arc<Scope>>> = RefCell::new(None);
}

/// Installs a fresh scope for the duration of `f`.
///
/// # Panics
/// If the current thread already belongs to a scope.
pub(super) fn exclusive_scope<T>(f: impl FnOnce(&Arc<Scope>) -> T) -> T {
    let scope = SCOPE.with(|thread_local| {
        let mut cell = thread_local.borrow_mut();
        assert!(cell.is_none(), "runtime::start can't be nested");
        let scope = Arc::new(Scope::new());
        *cell = Some(scope.clone());
        scope
    });

    let output = f(&scope);

    SCOPE.with(|thread_local| {
        *thread_local.borrow_mut() = None;
    });

    output
}

/// Joins the calling thread to a scope created on another thread.
pub(super) fn inherit(scope: Arc<Scope>) {
    SCOPE.with(|thread_local| {
        *thread_local.borrow_mut() = Some(scope);
    });
}

/// Scope of the running task.
///
/// # Panics
/// If called outside of [super::start].
pub(super) fn scope() -> Arc<Scope> {
    SCOPE.with(|thread_local| {
        thread_local
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("runtime::spawn called outside of runtime::start"))
    })
}
