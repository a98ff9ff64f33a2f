use std::collections::HashSet;
use std::convert::Infallible;

use super::{Host, Locals, Slot, ThreadStatus, TypeShape};
use crate::debugger::PostMortem;

/// Host whose threads are plain numbers, used by unit tests.
#[derive(Default)]
pub(crate) struct MockHost {
    alive: HashSet<u64>,
}

impl MockHost {
    pub fn with_threads(threads: impl IntoIterator<Item = u64>) -> Self {
        Self {
            alive: threads.into_iter().collect(),
        }
    }
}

impl Host for MockHost {
    type Thread = u64;
    type Value = String;
    type Binding = Locals<String>;
    type Scope = Vec<(String, String)>;
    type Type = String;
    type Error = Infallible;

    fn current_thread(&self) -> u64 {
        0
    }

    fn list_threads(&self) -> Vec<u64> {
        let mut threads: Vec<_> = self.alive.iter().copied().collect();
        threads.sort_unstable();
        threads
    }

    fn is_thread_alive(&self, thread: &u64) -> bool {
        self.alive.contains(thread)
    }

    fn thread_status(&self, _thread: &u64) -> ThreadStatus {
        ThreadStatus::Running
    }

    fn create_binding(&self, _receiver: &String) -> Locals<String> {
        Locals::new()
    }

    fn synthesize_binding(
        &self,
        _receiver: Option<&String>,
        locals: &Locals<String>,
    ) -> Option<Locals<String>> {
        Some(locals.clone())
    }

    fn eval_condition(
        &self,
        expr: &str,
        _binding: Option<&Locals<String>>,
    ) -> Result<bool, Infallible> {
        Ok(expr == "true")
    }

    fn scope_slots(&self, scope: &Self::Scope) -> Vec<Slot<String>> {
        scope
            .iter()
            .map(|(name, value)| Slot::new(name.as_str(), value.clone()))
            .collect()
    }

    fn dynamic_slots(&self, _scope: &Self::Scope) -> Vec<Slot<String>> {
        Vec::new()
    }

    fn type_shape(&self, ty: &String) -> TypeShape<String> {
        match ty.strip_prefix("#<Class:") {
            Some(attached) => TypeShape::Singleton(attached.trim_end_matches('>').to_owned()),
            None => TypeShape::Class,
        }
    }

    fn type_name(&self, ty: &String) -> Option<String> {
        Some(ty.clone())
    }

    fn exception_ancestors(&self, exception: &String) -> Vec<String> {
        vec![exception.clone()]
    }

    fn is_exit_exception(&self, exception: &String) -> bool {
        exception == "SystemExit"
    }

    fn attach_post_mortem(&self, _exception: &String, _post_mortem: PostMortem<Self>) {}
}
