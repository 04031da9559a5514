//! Named sub-patterns callable with [`crate::Branch::run`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::branch::Branch;
use crate::thread::BranchResult;

/// A sub-pattern body. Called once per `run`.
pub type PatternFn = Rc<dyn Fn(Branch) -> LocalBoxFuture<'static, BranchResult>>;

/// Registry of sub-patterns.
#[derive(Clone, Default)]
pub struct PatternLibrary {
    patterns: BTreeMap<String, PatternFn>,
}

impl fmt::Debug for PatternLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternLibrary")
            .field("patterns", &self.patterns.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PatternLibrary {
    /// Empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a sub-pattern.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, pattern: F)
    where
        F: Fn(Branch) -> Fut + 'static,
        Fut: Future<Output = BranchResult> + 'static,
    {
        let pattern: PatternFn = Rc::new(move |branch| pattern(branch).boxed_local());
        self.patterns.insert(name.into(), pattern);
    }

    /// Builder form of [`PatternLibrary::register`].
    #[must_use]
    pub fn with<F, Fut>(mut self, name: impl Into<String>, pattern: F) -> Self
    where
        F: Fn(Branch) -> Fut + 'static,
        Fut: Future<Output = BranchResult> + 'static,
    {
        self.register(name, pattern);
        self
    }

    /// Whether a pattern is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub(crate) fn get(&self, name: &str) -> Option<PatternFn> {
        self.patterns.get(name).cloned()
    }
}
