use super::cx::Cx;
use super::dispatcher::Dispatcher;
use crate::cancel::Scope;

use std::fmt;
use std::rc::Rc;

/// A captured position in the scope nesting.
///
/// Produced by [`Cx::context_depth`]. Every branch spawned by the runtime
/// carries the token it was forked under; before the branch is polled, the
/// dispatcher installs the token again and the branch's [`Cx`] is rebuilt
/// from it. A branch resumed from a bare clock callback therefore observes
/// exactly the scopes that enclosed it when it was forked.
#[derive(Clone)]
pub struct ContextToken {
    /// Innermost enclosing scope, if any.
    scope: Option<Rc<Scope>>,

    /// Whether interleaving was disabled at capture time.
    synchronous: bool,

    /// Value of the scope's tag counter at capture time.
    tag: u64,
}

impl ContextToken {
    pub(crate) fn new(scope: Option<Rc<Scope>>, synchronous: bool, tag: u64) -> Self {
        Self {
            scope,
            synchronous,
            tag,
        }
    }

    /// Number of cancellation scopes enclosing the captured position.
    pub fn depth(&self) -> usize {
        self.scope.as_ref().map_or(0, |scope| scope.depth())
    }

    /// Tag handed out by the innermost scope's counter.
    ///
    /// Tags increase with every capture inside the same scope, so two tokens
    /// of the same scope are told apart by their tag.
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Returns `true` if the token was captured inside
    /// [`synchronous`](crate::task::synchronous).
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Returns `true` if both tokens point at the same scope.
    pub fn same_scope(&self, other: &ContextToken) -> bool {
        match (&self.scope, &other.scope) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Rebuilds the capability handle of the captured position.
    pub(crate) fn restore(&self, dispatcher: &Rc<Dispatcher>) -> Cx {
        Cx::new(dispatcher.clone(), self.scope.clone(), self.synchronous)
    }
}

impl fmt::Debug for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextToken")
            .field("depth", &self.depth())
            .field("tag", &self.tag)
            .field("synchronous", &self.synchronous)
            .finish()
    }
}
