mod event;
#[cfg(test)]
pub(crate) mod mock;

use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;

pub use self::event::{Event, EventKind, MethodId, Position};
use crate::debugger::PostMortem;

/// Name to value mapping of the local variables of a frame.
pub type Locals<V> = IndexMap<String, V>;

/// Trait implementing the runtime queries the debugger core needs from the
/// host interpreter.
///
/// The host owns every runtime object. The debugger core only ever holds
/// opaque handles to them (threads, values, bindings, scopes and types), and
/// asks the host whenever it needs to look inside one.
///
/// # Note
///
/// All these functions may be called while the debugger holds internal
/// locks. The implementor must not call back into the
/// [Debugger](crate::Debugger) from them.
pub trait Host: Send + Sync {
    /// Handle of a host thread.
    type Thread: Clone + Eq + Hash + Debug + Send + Sync;

    /// Reference to a host object.
    type Value: Clone + Debug + Send + Sync;

    /// Handle allowing to evaluate expressions as if executing at a captured
    /// point of a call.
    type Binding: Clone + Debug + Send + Sync;

    /// Handle over the live variable scope of a call activation.
    ///
    /// It is only guaranteed to be valid while the activation is on the
    /// host's call stack.
    type Scope: Clone + Debug + Send + Sync;

    /// Reference to a host type (class, module, ...).
    type Type: Clone + Debug + Send + Sync;

    /// Error returned when evaluating an expression.
    type Error: std::error::Error;

    /// Returns the thread currently executing.
    fn current_thread(&self) -> Self::Thread;

    /// Returns every live thread of the host.
    fn list_threads(&self) -> Vec<Self::Thread>;

    /// Returns whether the given handle designates a live thread.
    ///
    /// Unknown handles must be reported as not alive.
    fn is_thread_alive(&self, thread: &Self::Thread) -> bool;

    /// Returns the scheduling status of the given thread.
    fn thread_status(&self, thread: &Self::Thread) -> ThreadStatus;

    /// Returns whether the given thread belongs to the debugger front-end.
    ///
    /// Such threads never trigger any debugger logic.
    fn is_debugger_thread(&self, _thread: &Self::Thread) -> bool {
        false
    }

    /// Returns whether the given method identifier is the host's object
    /// allocator, whose events are never processed.
    fn is_allocator(&self, _method: &MethodId) -> bool {
        false
    }

    /// Creates a binding for the given receiver at the current execution
    /// point.
    fn create_binding(&self, receiver: &Self::Value) -> Self::Binding;

    /// Creates a binding from a set of local variables, for frames whose
    /// binding was not captured.
    fn synthesize_binding(
        &self,
        _receiver: Option<&Self::Value>,
        _locals: &Locals<Self::Value>,
    ) -> Option<Self::Binding> {
        None
    }

    /// Evaluates a condition within the given binding.
    fn eval_condition(
        &self,
        expr: &str,
        binding: Option<&Self::Binding>,
    ) -> Result<bool, Self::Error>;

    /// Returns the variable slots of the scope chain.
    fn scope_slots(&self, scope: &Self::Scope) -> Vec<Slot<Self::Value>>;

    /// Returns the dynamic (block-local) variable slots attached to the scope.
    fn dynamic_slots(&self, scope: &Self::Scope) -> Vec<Slot<Self::Value>>;

    /// Returns the shape of the given type.
    fn type_shape(&self, ty: &Self::Type) -> TypeShape<Self::Type>;

    /// Returns the name of the given type, if it has one.
    fn type_name(&self, ty: &Self::Type) -> Option<String>;

    /// Returns the names of the exception's type and of all its ancestors,
    /// starting with the exception's own type.
    fn exception_ancestors(&self, exception: &Self::Value) -> Vec<String>;

    /// Returns whether the exception requests the process to terminate.
    fn is_exit_exception(&self, exception: &Self::Value) -> bool;

    /// Attaches post-mortem information to an in-flight exception.
    fn attach_post_mortem(&self, exception: &Self::Value, post_mortem: PostMortem<Self>)
    where
        Self: Sized;
}

/// Scheduling status of a host thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// The thread is runnable.
    Running,

    /// The thread is blocked.
    Sleeping,

    /// The thread is aborting, or in any other state.
    Other,
}

/// Shape of a host type.
#[derive(Clone, Debug)]
pub enum TypeShape<T> {
    /// A named class.
    Class,

    /// A named module.
    Module,

    /// Anonymous wrapper of a module included into another type.
    IncludedModule(T),

    /// Singleton type, attached to the given object.
    Singleton(T),

    /// Any other type.
    Other,
}

/// Variable slot of a scope.
#[derive(Clone, Debug)]
pub struct Slot<V> {
    /// Name of the variable.
    pub name: String,

    /// Value of the variable.
    pub value: V,
}

impl<V> Slot<V> {
    /// Creates a new variable slot.
    pub fn new(name: impl Into<String>, value: V) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Returns the type hidden behind anonymous wrapper types.
pub(crate) fn real_type<H: Host>(host: &H, ty: &H::Type) -> H::Type {
    match host.type_shape(ty) {
        TypeShape::IncludedModule(module) => module,
        TypeShape::Singleton(attached) => attached,
        _ => ty.clone(),
    }
}

/// Returns whether a variable name is visible to the user.
///
/// Internal slots (special globals, flip-flop states) have names that are not
/// local identifiers.
pub(crate) fn is_user_visible(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };

    (first == '_' || first.is_lowercase()) && chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Reads the locals of a live scope, merging the scope chain and the dynamic
/// variables into a single mapping.
pub(crate) fn copy_locals<H: Host>(host: &H, scope: Option<&H::Scope>) -> Locals<H::Value> {
    let Some(scope) = scope else {
        return Locals::new();
    };

    host.scope_slots(scope)
        .into_iter()
        .chain(host.dynamic_slots(scope))
        .filter(|slot| is_user_visible(&slot.name))
        .map(|slot| (slot.name, slot.value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::is_user_visible;

    #[test]
    fn user_visible_names() {
        assert!(is_user_visible("x"));
        assert!(is_user_visible("_tmp"));
        assert!(is_user_visible("counter_2"));

        assert!(!is_user_visible(""));
        assert!(!is_user_visible("$_"));
        assert!(!is_user_visible("$~"));
        assert!(!is_user_visible("Const"));
        assert!(!is_user_visible("@ivar"));
    }
}
