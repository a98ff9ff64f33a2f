use indexmap::IndexMap;

use super::Context;
use crate::host::Host;

/// Table of the debug contexts, keyed by host thread.
pub(crate) struct ThreadTable<H: Host> {
    contexts: IndexMap<H::Thread, Context<H>>,

    /// Most recently resolved context.
    last: Option<Context<H>>,
}

impl<H: Host> Default for ThreadTable<H> {
    fn default() -> Self {
        Self {
            contexts: IndexMap::new(),
            last: None,
        }
    }
}

impl<H: Host> ThreadTable<H> {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn lookup(&mut self, thread: &H::Thread) -> Option<Context<H>> {
        if let Some(last) = &self.last {
            if last.thread_ref() == thread {
                return Some(last.clone());
            }
        }

        let context = self.contexts.get(thread)?.clone();
        self.last = Some(context.clone());

        Some(context)
    }

    pub fn lookup_or_create(
        &mut self,
        thread: &H::Thread,
        create: impl FnOnce() -> Context<H>,
    ) -> Context<H> {
        if let Some(context) = self.lookup(thread) {
            return context;
        }

        let context = create();

        tracing::debug!(thnum = context.thnum(), ?thread, "new thread context");

        self.contexts.insert(thread.clone(), context.clone());
        self.last = Some(context.clone());

        context
    }

    /// Removes the contexts of the threads which are no longer alive.
    pub fn prune(&mut self, host: &H) -> usize {
        let before = self.contexts.len();

        self.contexts
            .retain(|thread, _| host.is_thread_alive(thread));

        self.drop_stale_cache();

        before - self.contexts.len()
    }

    /// Replaces the table content by the contexts of the given threads,
    /// creating the missing ones.
    pub fn rebuild(
        &mut self,
        threads: Vec<H::Thread>,
        mut create: impl FnMut(&H::Thread) -> Context<H>,
    ) -> Vec<Context<H>> {
        let mut contexts = IndexMap::with_capacity(threads.len());

        for thread in threads {
            let context = match self.contexts.swap_remove(&thread) {
                Some(context) => context,
                None => create(&thread),
            };

            contexts.insert(thread, context);
        }

        self.contexts = contexts;
        self.drop_stale_cache();

        self.contexts.values().cloned().collect()
    }

    pub fn find_by_thnum(&self, thnum: u64) -> Option<Context<H>> {
        self.contexts
            .values()
            .find(|context| context.thnum() == thnum)
            .cloned()
    }

    fn drop_stale_cache(&mut self) {
        let stale = self
            .last
            .as_ref()
            .is_some_and(|last| !self.contexts.contains_key(last.thread_ref()));

        if stale {
            self.last = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::ThreadTable;
    use crate::context::Context;
    use crate::host::mock::MockHost;

    fn context(thread: u64) -> Context<MockHost> {
        Context::new(thread, thread, Arc::new(AtomicBool::new(true)), false)
    }

    #[test]
    fn lookup_is_stable() {
        let mut table = ThreadTable::<MockHost>::default();

        let first = table.lookup_or_create(&1, || context(1));
        let again = table.lookup_or_create(&1, || context(100));
        assert_eq!(first, again);
        assert_eq!(again.thnum(), 1);

        let other = table.lookup_or_create(&2, || context(2));
        assert_ne!(first, other);
        assert_eq!(table.lookup(&1), Some(first));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn prune_dead_threads() {
        let host = MockHost::with_threads([1, 3]);
        let mut table = ThreadTable::<MockHost>::default();

        for thread in 1..=3 {
            table.lookup_or_create(&thread, || context(thread));
        }

        assert_eq!(table.prune(&host), 1);
        assert!(table.lookup(&2).is_none());
        assert!(table.lookup(&3).is_some());
    }

    #[test]
    fn rebuild_keeps_existing_contexts() {
        let mut table = ThreadTable::<MockHost>::default();

        let kept = table.lookup_or_create(&1, || context(1));
        table.lookup_or_create(&2, || context(2));

        let contexts = table.rebuild(vec![1, 4], |thread| context(*thread));

        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0], kept);
        assert_eq!(contexts[1].thnum(), 4);
        assert!(table.lookup(&2).is_none());
        assert_eq!(table.find_by_thnum(4), Some(contexts[1].clone()));
    }
}
