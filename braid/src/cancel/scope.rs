use crate::error::Error;
use crate::registry::{Id, Registry};
use crate::runtime::{Continuation, Delivery};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace};

/// A cancellation scope.
///
/// A scope owns a [`Registry`] of the suspensions made inside it and a flag
/// that is set at most once. Canceling the scope resumes every registered
/// suspension with [`Error::Cancel`]; any suspension reached afterwards
/// abandons its branch instead of waiting.
pub(crate) struct Scope {
    /// Enclosing scope, if any.
    parent: Option<Rc<Scope>>,

    /// Suspensions currently registered inside this scope.
    registry: RefCell<Registry<Continuation>>,

    canceled: Cell<bool>,

    /// Counter behind [`ContextToken`](crate::ContextToken) tags.
    tags: Cell<u64>,

    /// Number of scopes from the root down to this one, inclusive.
    depth: usize,
}

impl Scope {
    pub(crate) fn new(parent: Option<Rc<Scope>>) -> Rc<Self> {
        let depth = parent.as_ref().map_or(0, |parent| parent.depth) + 1;

        Rc::new(Self {
            parent,
            registry: RefCell::new(Registry::new()),
            canceled: Cell::new(false),
            tags: Cell::new(0),
            depth,
        })
    }

    pub(crate) fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.get()
    }

    /// Returns `true` if this scope or any enclosing one is canceled.
    pub(crate) fn chain_canceled(&self) -> bool {
        let mut scope = Some(self);

        while let Some(current) = scope {
            if current.canceled.get() {
                return true;
            }
            scope = current.parent.as_deref();
        }

        false
    }

    pub(crate) fn next_tag(&self) -> u64 {
        let tag = self.tags.get() + 1;
        self.tags.set(tag);
        tag
    }

    /// Registers `inner` with this scope.
    ///
    /// Returns the id of the registration and the continuation the enclosing
    /// layer must invoke instead of `inner`. That wrapper unregisters first,
    /// then delivers to `inner`, turning a resumption into an abandonment if
    /// the scope has been canceled meanwhile.
    pub(crate) fn intercept(self: &Rc<Self>, inner: Continuation, budget: usize) -> (Id, Continuation) {
        let id = self.registry.borrow_mut().register(inner.clone(), budget);
        let scope = Rc::downgrade(self);

        let wrapper: Continuation = Rc::new(move |delivery: Delivery| {
            let Some(scope) = scope.upgrade() else {
                inner(delivery);
                return;
            };

            scope
                .registry
                .borrow_mut()
                .unregister_if(id, false, |registered| Rc::ptr_eq(registered, &inner));

            let delivery = match delivery {
                Delivery::Resume(_) if scope.canceled.get() => {
                    trace!(%id, depth = scope.depth, "resumed after cancellation, abandoning");
                    Delivery::Abandon(None)
                }
                delivery => delivery,
            };

            inner(delivery);
        });

        (id, wrapper)
    }

    /// Drops the registration `id` if it still belongs to `inner`.
    pub(crate) fn release(&self, id: Id, inner: &Continuation) {
        self.registry
            .borrow_mut()
            .unregister_if(id, true, |registered| Rc::ptr_eq(registered, inner));
    }

    /// Number of suspensions registered inside this scope.
    pub(crate) fn outstanding(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Cancels the scope.
    ///
    /// Sets the flag, snapshots and clears the registry, then resumes each
    /// snapshot entry with [`Error::Cancel`] in ascending id order. Each
    /// resumption runs its branch up to its next suspension point before
    /// the next one starts. Returns `false` if the scope was already
    /// canceled.
    pub(crate) fn request_cancel(&self) -> bool {
        if self.canceled.replace(true) {
            return false;
        }

        let pending = {
            let mut registry = self.registry.borrow_mut();
            let pending = registry.elements();
            registry.clear();
            pending
        };

        debug!(depth = self.depth, pending = pending.len(), "canceling scope");

        for continuation in pending {
            continuation(Delivery::Resume(Err(Error::Cancel)));
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> Continuation {
        let log = log.clone();

        Rc::new(move |delivery: Delivery| {
            let entry = match delivery {
                Delivery::Resume(Ok(_)) => format!("{name}: value"),
                Delivery::Resume(Err(error)) => format!("{name}: {}", error.tag()),
                Delivery::Abandon(_) => format!("{name}: abandoned"),
            };
            log.borrow_mut().push(entry);
        })
    }

    #[test]
    fn cancel_reaches_every_entry_in_order() {
        let log = Log::default();
        let scope = Scope::new(None);

        scope.intercept(recorder(&log, "a"), 1);
        scope.intercept(recorder(&log, "b"), 1);
        scope.intercept(recorder(&log, "c"), 1);

        assert!(scope.request_cancel());
        assert_eq!(scope.outstanding(), 0);
        assert_eq!(*log.borrow(), vec!["a: Cancel", "b: Cancel", "c: Cancel"]);

        assert!(!scope.request_cancel());
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn resume_after_cancel_abandons() {
        let log = Log::default();
        let scope = Scope::new(None);

        let (_, wrapper) = scope.intercept(recorder(&log, "late"), 1);
        scope.canceled.set(true);
        wrapper(Delivery::Resume(Ok(Box::new(()))));

        assert_eq!(*log.borrow(), vec!["late: abandoned"]);
    }

    #[test]
    fn resume_unregisters_first() {
        let log = Log::default();
        let scope = Scope::new(None);

        let (_, wrapper) = scope.intercept(recorder(&log, "a"), 2);
        wrapper(Delivery::Resume(Ok(Box::new(()))));
        assert_eq!(scope.outstanding(), 1);

        wrapper(Delivery::Resume(Ok(Box::new(()))));
        assert_eq!(scope.outstanding(), 0);
        assert_eq!(*log.borrow(), vec!["a: value", "a: value"]);
    }

    #[test]
    fn release_ignores_recycled_ids() {
        let log = Log::default();
        let scope = Scope::new(None);

        let old = recorder(&log, "old");
        let (id, _) = scope.intercept(old.clone(), 1);
        scope.release(id, &old);

        let (recycled, _) = scope.intercept(recorder(&log, "new"), 1);
        assert_eq!(recycled, id);

        scope.release(id, &old);
        assert_eq!(scope.outstanding(), 1);
    }

    #[test]
    fn cancellation_is_seen_from_nested_scopes() {
        let outer = Scope::new(None);
        let inner = Scope::new(Some(outer.clone()));

        assert_eq!(inner.depth(), 2);
        assert!(!inner.chain_canceled());

        outer.request_cancel();

        assert!(inner.chain_canceled());
        assert!(!inner.is_canceled());
    }
}
