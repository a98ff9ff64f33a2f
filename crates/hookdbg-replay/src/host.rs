use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;

use hookdbg_core::PostMortem;
use hookdbg_core::host::{Host, Locals, MethodId, Slot, ThreadStatus, TypeShape};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::EvalError;
use crate::eval;
use crate::program::Program;
use crate::value::{BindingVars, ReplayBinding, ReplayScope, ReplayType, ReplayValue};

/// Exception classes every program knows, with their parent.
const BUILTIN_EXCEPTIONS: &[(&str, Option<&str>)] = &[
    ("Exception", None),
    ("StandardError", Some("Exception")),
    ("RuntimeError", Some("StandardError")),
    ("ArgumentError", Some("StandardError")),
    ("SystemExit", Some("Exception")),
    ("Interrupt", Some("Exception")),
];

/// Modules every program knows.
const BUILTIN_MODULES: &[&str] = &["Kernel", "Comparable", "Enumerable"];

/// Ancestors shared by every object.
const ROOT_ANCESTORS: &[&str] = &["Object", "Kernel", "BasicObject"];

/// Name of the object allocator.
const ALLOCATOR: &str = "allocate";

/// Handle of a replayed thread.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ReplayThread {
    id: u64,
    name: Arc<str>,
}

impl ReplayThread {
    /// Returns the name of the thread.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ReplayThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<Thread:{} {}>", self.id, self.name)
    }
}

impl fmt::Display for ReplayThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

struct ThreadRecord {
    os_thread: Option<ThreadId>,
    status: ThreadStatus,
    alive: bool,
    debugger: bool,
    scope: ReplayScope,
}

#[derive(Default)]
struct HostState {
    threads: IndexMap<ReplayThread, ThreadRecord>,
    by_os_thread: HashMap<ThreadId, ReplayThread>,
    next_thread_id: u64,
    modules: Vec<String>,
    exceptions: HashMap<String, Option<String>>,
    next_raise_id: u64,
    post_mortems: IndexMap<u64, PostMortem<ReplayHost>>,
}

impl HostState {
    fn register(&mut self, name: &str) -> ReplayThread {
        self.next_thread_id += 1;

        let thread = ReplayThread {
            id: self.next_thread_id,
            name: name.into(),
        };

        self.threads.insert(
            thread.clone(),
            ThreadRecord {
                os_thread: None,
                status: ThreadStatus::Running,
                alive: true,
                debugger: false,
                scope: ReplayScope::default(),
            },
        );

        thread
    }

    fn current(&mut self) -> ReplayThread {
        let os_thread = std::thread::current().id();

        if let Some(thread) = self.by_os_thread.get(&os_thread) {
            return thread.clone();
        }

        let name = if self.threads.is_empty() {
            "main".to_owned()
        } else {
            format!("thread-{}", self.next_thread_id + 1)
        };

        let thread = self.register(&name);
        self.bind(&thread, os_thread);

        thread
    }

    fn bind(&mut self, thread: &ReplayThread, os_thread: ThreadId) {
        if let Some(record) = self.threads.get_mut(thread) {
            record.os_thread = Some(os_thread);
        }

        self.by_os_thread.insert(os_thread, thread.clone());
    }
}

/// Host runtime of replayed programs.
///
/// Every replayed thread runs on its own OS thread. OS threads calling into
/// the host without being bound to a replayed thread are registered on the
/// fly, the first one being named `main`.
pub struct ReplayHost {
    state: Mutex<HostState>,
}

impl Default for ReplayHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayHost {
    /// Creates a host knowing the builtin types only.
    pub fn new() -> Self {
        let mut state = HostState::default();

        state.modules = BUILTIN_MODULES.iter().map(|m| m.to_string()).collect();
        state.exceptions = BUILTIN_EXCEPTIONS
            .iter()
            .map(|(name, parent)| (name.to_string(), parent.map(str::to_owned)))
            .collect();

        Self {
            state: Mutex::new(state),
        }
    }

    /// Declares the types and exception classes of a program.
    pub fn declare(&self, program: &Program) {
        let mut state = self.state.lock();

        for ty in &program.types {
            if ty.kind.as_deref() == Some("module") && !state.modules.contains(&ty.name) {
                state.modules.push(ty.name.clone());
            }
        }

        for exception in &program.exceptions {
            let parent = exception
                .parent
                .clone()
                .unwrap_or_else(|| "StandardError".to_owned());

            state.exceptions.insert(exception.name.clone(), Some(parent));
        }
    }

    /// Registers a new live thread, not bound to any OS thread yet.
    pub fn spawn_thread(&self, name: &str) -> ReplayThread {
        let thread = self.state.lock().register(name);

        tracing::debug!(thread = %thread, "thread spawned");
        thread
    }

    /// Binds the calling OS thread to a replayed thread.
    pub fn bind_current(&self, thread: &ReplayThread) {
        self.state.lock().bind(thread, std::thread::current().id());
    }

    /// Marks a thread as exited.
    pub fn exit_thread(&self, thread: &ReplayThread) {
        let mut state = self.state.lock();

        if let Some(record) = state.threads.get_mut(thread) {
            record.alive = false;

            if let Some(os_thread) = record.os_thread.take() {
                state.by_os_thread.remove(&os_thread);
            }
        }

        tracing::debug!(thread = %thread, "thread exited");
    }

    /// Sets the scheduling status of a thread.
    pub fn set_status(&self, thread: &ReplayThread, status: ThreadStatus) {
        if let Some(record) = self.state.lock().threads.get_mut(thread) {
            record.status = status;
        }
    }

    /// Marks a thread as belonging to the debugger front-end.
    pub fn set_debugger_thread(&self, thread: &ReplayThread) {
        if let Some(record) = self.state.lock().threads.get_mut(thread) {
            record.debugger = true;
        }
    }

    /// Sets the live scope of the calling thread, captured by new bindings.
    pub fn enter_scope(&self, scope: &ReplayScope) {
        let mut state = self.state.lock();
        let thread = state.current();

        if let Some(record) = state.threads.get_mut(&thread) {
            record.scope = scope.clone();
        }
    }

    /// Looks up a thread by name.
    pub fn thread(&self, name: &str) -> Option<ReplayThread> {
        self.state
            .lock()
            .threads
            .keys()
            .find(|thread| thread.name() == name)
            .cloned()
    }

    /// Creates a new exception of the given class.
    pub fn new_exception(&self, class: &str) -> ReplayValue {
        let mut state = self.state.lock();
        state.next_raise_id += 1;

        ReplayValue::Exception {
            class: class.into(),
            id: state.next_raise_id,
        }
    }

    /// Returns the post-mortem information attached to an exception.
    pub fn post_mortem(&self, exception: &ReplayValue) -> Option<PostMortem<Self>> {
        let ReplayValue::Exception { id, .. } = exception else {
            return None;
        };

        self.state.lock().post_mortems.get(id).cloned()
    }

    /// Returns every post-mortem information attached so far, in raise
    /// order.
    pub fn post_mortems(&self) -> Vec<PostMortem<Self>> {
        self.state.lock().post_mortems.values().cloned().collect()
    }

    fn is_module(&self, name: &str) -> bool {
        self.state.lock().modules.iter().any(|m| m == name)
    }
}

impl Host for ReplayHost {
    type Thread = ReplayThread;
    type Value = ReplayValue;
    type Binding = ReplayBinding;
    type Scope = ReplayScope;
    type Type = ReplayType;
    type Error = EvalError;

    fn current_thread(&self) -> Self::Thread {
        self.state.lock().current()
    }

    fn list_threads(&self) -> Vec<Self::Thread> {
        self.state
            .lock()
            .threads
            .iter()
            .filter(|(_, record)| record.alive)
            .map(|(thread, _)| thread.clone())
            .collect()
    }

    fn is_thread_alive(&self, thread: &Self::Thread) -> bool {
        self.state
            .lock()
            .threads
            .get(thread)
            .is_some_and(|record| record.alive)
    }

    fn thread_status(&self, thread: &Self::Thread) -> ThreadStatus {
        match self.state.lock().threads.get(thread) {
            Some(record) if record.alive => record.status,
            _ => ThreadStatus::Other,
        }
    }

    fn is_debugger_thread(&self, thread: &Self::Thread) -> bool {
        self.state
            .lock()
            .threads
            .get(thread)
            .is_some_and(|record| record.debugger)
    }

    fn is_allocator(&self, method: &MethodId) -> bool {
        method.as_str() == ALLOCATOR
    }

    fn create_binding(&self, receiver: &Self::Value) -> Self::Binding {
        let mut state = self.state.lock();
        let thread = state.current();

        let scope = state
            .threads
            .get(&thread)
            .map(|record| record.scope.clone())
            .unwrap_or_default();

        ReplayBinding {
            receiver: receiver.clone(),
            vars: BindingVars::Live(scope),
        }
    }

    fn synthesize_binding(
        &self,
        receiver: Option<&Self::Value>,
        locals: &Locals<Self::Value>,
    ) -> Option<Self::Binding> {
        Some(ReplayBinding {
            receiver: receiver.cloned().unwrap_or(ReplayValue::Nil),
            vars: BindingVars::Frozen(locals.clone()),
        })
    }

    fn eval_condition(
        &self,
        expr: &str,
        binding: Option<&Self::Binding>,
    ) -> Result<bool, Self::Error> {
        eval::evaluate(expr, binding)
    }

    fn scope_slots(&self, scope: &Self::Scope) -> Vec<Slot<Self::Value>> {
        scope
            .locals()
            .into_iter()
            .map(|(name, value)| Slot::new(name, value))
            .collect()
    }

    fn dynamic_slots(&self, scope: &Self::Scope) -> Vec<Slot<Self::Value>> {
        scope
            .dynamic()
            .into_iter()
            .map(|(name, value)| Slot::new(name, value))
            .collect()
    }

    fn type_shape(&self, ty: &Self::Type) -> TypeShape<Self::Type> {
        if let Some(attached) = ty.singleton_of() {
            TypeShape::Singleton(attached)
        } else if let Some(module) = ty.included_module() {
            TypeShape::IncludedModule(module)
        } else if ty.name().is_empty() {
            TypeShape::Other
        } else if self.is_module(ty.name()) {
            TypeShape::Module
        } else {
            TypeShape::Class
        }
    }

    fn type_name(&self, ty: &Self::Type) -> Option<String> {
        if ty.name().is_empty() || ty.name().starts_with("#<") {
            None
        } else {
            Some(ty.name().to_owned())
        }
    }

    fn exception_ancestors(&self, exception: &Self::Value) -> Vec<String> {
        let class = match exception {
            ReplayValue::Exception { class, .. } | ReplayValue::Object { class } => {
                class.to_string()
            }
            _ => return ROOT_ANCESTORS.iter().map(|a| a.to_string()).collect(),
        };

        let state = self.state.lock();
        let mut ancestors = vec![];
        let mut next = Some(class);

        while let Some(class) = next.take() {
            if ancestors.contains(&class) {
                break;
            }

            next = state.exceptions.get(&class).cloned().flatten();
            ancestors.push(class);
        }

        ancestors.extend(ROOT_ANCESTORS.iter().map(|a| a.to_string()));
        ancestors
    }

    fn is_exit_exception(&self, exception: &Self::Value) -> bool {
        matches!(exception, ReplayValue::Exception { class, .. } if &**class == "SystemExit")
    }

    fn attach_post_mortem(&self, exception: &Self::Value, post_mortem: PostMortem<Self>) {
        let ReplayValue::Exception { id, .. } = exception else {
            return;
        };

        self.state.lock().post_mortems.insert(*id, post_mortem);
    }
}
