use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::any::TypeId;
use std::sync::Arc;

use crate::jobs::JobPusher;
use crate::types::{Backend, JobMessage};
use crate::UniqueResult;

/// Result of running a push through the producer chain
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The backend accepted the job; carries the payload that was sent
    Pushed(Map<String, Value>),

    /// An interceptor stopped the push (e.g. an active uniqueness lock)
    NotAdmitted,
}

impl PushOutcome {
    pub fn is_pushed(&self) -> bool {
        matches!(self, Self::Pushed(_))
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Pushed(payload) => Some(payload),
            Self::NotAdmitted => None,
        }
    }
}

/// Producer-side interceptor wrapping the backend push
///
/// Call `next.run(job, backend)` to continue, or return without calling it to
/// stop the push.
#[async_trait]
pub trait ClientMiddleware: Send + Sync + 'static {
    async fn call(
        &self,
        job: &mut JobMessage,
        backend: Backend,
        next: Next<'_>,
    ) -> UniqueResult<PushOutcome>;
}

/// The rest of the producer chain, ending at the pusher
pub struct Next<'a> {
    rest: &'a [Arc<dyn ClientMiddleware>],
    endpoint: &'a dyn JobPusher,
}

impl<'a> Next<'a> {
    pub async fn run(self, job: &mut JobMessage, backend: Backend) -> UniqueResult<PushOutcome> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    rest,
                    endpoint: self.endpoint,
                };
                head.call(job, backend, next).await
            }
            None => {
                self.endpoint.push(backend, job.payload()).await?;
                Ok(PushOutcome::Pushed(job.payload().clone()))
            }
        }
    }
}

/// Interceptors keyed by their concrete type, in registration order
pub(crate) struct Entries<T: ?Sized> {
    entries: RwLock<Vec<(TypeId, Arc<T>)>>,
}

impl<T: ?Sized> Entries<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    // Replaces in place when the type is already installed
    pub(crate) fn add(&self, type_id: TypeId, entry: Arc<T>) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(id, _)| *id == type_id) {
            Some(slot) => slot.1 = entry,
            None => entries.push((type_id, entry)),
        }
    }

    pub(crate) fn exists(&self, type_id: TypeId) -> bool {
        self.entries.read().iter().any(|(id, _)| *id == type_id)
    }

    pub(crate) fn remove(&self, type_id: TypeId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(id, _)| *id != type_id);
        entries.len() != before
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Cloned handles, so no guard is held across an await
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.read().iter().map(|(_, e)| e.clone()).collect()
    }
}

/// Ordered producer interceptors for one backend
///
/// The first interceptor added runs first and wraps all the others. The chain
/// holds no per-job state and is reused for every push.
pub struct MiddlewareChain {
    entries: Entries<dyn ClientMiddleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            entries: Entries::new(),
        }
    }

    /// Install an interceptor; installing the same type again replaces it
    pub fn add<M: ClientMiddleware>(&self, middleware: M) {
        self.entries.add(TypeId::of::<M>(), Arc::new(middleware));
    }

    pub fn exists<M: ClientMiddleware>(&self) -> bool {
        self.entries.exists(TypeId::of::<M>())
    }

    pub fn remove<M: ClientMiddleware>(&self) -> bool {
        self.entries.remove(TypeId::of::<M>())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `job` through every interceptor and, unless one stops it, `endpoint`
    pub async fn invoke(
        &self,
        job: &mut JobMessage,
        backend: Backend,
        endpoint: &dyn JobPusher,
    ) -> UniqueResult<PushOutcome> {
        let chain = self.entries.snapshot();
        let next = Next {
            rest: &chain,
            endpoint,
        };
        next.run(job, backend).await
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}
