//! Native ingestion callback and its opaque context

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use contracts::ReadingSet;

/// Signature of an ingestion callback
///
/// The callback receives ownership of the batch.
pub type IngestFn = dyn Fn(&IngestContext, ReadingSet) + Send + Sync;

/// Ingestion callback registered by the native pipeline
#[derive(Clone)]
pub struct IngestCallback {
    name: String,
    func: Arc<IngestFn>,
}

impl IngestCallback {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&IngestContext, ReadingSet) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hand `readings` to the callback
    pub fn invoke(&self, context: &IngestContext, readings: ReadingSet) {
        (self.func)(context, readings)
    }
}

impl fmt::Debug for IngestCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestCallback")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Opaque parameter passed back to the callback
#[derive(Clone)]
pub struct IngestContext {
    inner: Arc<dyn Any + Send + Sync>,
}

impl IngestContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    pub fn from_arc(inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self { inner }
    }

    /// Borrow the context as `T`, if that is what it holds
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for IngestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestContext").finish_non_exhaustive()
    }
}
