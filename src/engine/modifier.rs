//! Deferred, replayable status mutations

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

type ApplyFn<S> = dyn Fn(&mut S) -> Result<()> + Send + Sync;

/// A named mutation of a root resource's status
///
/// Modifiers are applied once in memory when their component's result is
/// merged, and may be replayed against a freshly fetched copy if the status
/// write conflicts. Replaying must produce the same status, so anything
/// non-deterministic (timestamps, generated values) has to be captured before
/// the modifier is built.
pub struct StatusModifier<S> {
    name: Cow<'static, str>,
    apply: Arc<ApplyFn<S>>,
}

impl<S> StatusModifier<S> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, apply: F) -> Self
    where
        F: Fn(&mut S) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    /// Modifier whose mutation cannot fail
    pub fn infallible<F>(name: impl Into<Cow<'static, str>>, apply: F) -> Self
    where
        F: Fn(&mut S) + Send + Sync + 'static,
    {
        Self::new(name, move |status: &mut S| {
            apply(status);
            Ok(())
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, status: &mut S) -> Result<()> {
        (self.apply)(status)
    }
}

impl<S> Clone for StatusModifier<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<S> fmt::Debug for StatusModifier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusModifier")
            .field("name", &self.name)
            .finish()
    }
}
