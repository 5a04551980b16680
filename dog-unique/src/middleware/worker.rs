use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::TypeId;
use std::sync::Arc;

use super::chain::Entries;
use crate::types::WorkerCtx;
use crate::{JobError, UniqueResult};

/// The job body a worker runs once every interceptor has let it through
#[async_trait]
pub trait Perform: Send + Sync {
    async fn perform(&self, ctx: &WorkerCtx, payload: &Map<String, Value>) -> Result<(), JobError>;
}

/// Adapts a synchronous closure into a [`Perform`]
pub struct PerformFn<F>(pub F);

#[async_trait]
impl<F> Perform for PerformFn<F>
where
    F: Fn(&WorkerCtx, &Map<String, Value>) -> Result<(), JobError> + Send + Sync,
{
    async fn perform(&self, ctx: &WorkerCtx, payload: &Map<String, Value>) -> Result<(), JobError> {
        (self.0)(ctx, payload)
    }
}

/// Worker-side interceptor wrapping the execution of a fetched job
#[async_trait]
pub trait WorkerMiddleware: Send + Sync + 'static {
    async fn call(
        &self,
        ctx: &WorkerCtx,
        payload: &Map<String, Value>,
        queue: &str,
        next: WorkerNext<'_>,
    ) -> UniqueResult<()>;
}

/// The rest of the worker chain, ending at the job body
pub struct WorkerNext<'a> {
    rest: &'a [Arc<dyn WorkerMiddleware>],
    perform: &'a dyn Perform,
}

impl<'a> WorkerNext<'a> {
    pub async fn run(
        self,
        ctx: &WorkerCtx,
        payload: &Map<String, Value>,
        queue: &str,
    ) -> UniqueResult<()> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                let next = WorkerNext {
                    rest,
                    perform: self.perform,
                };
                head.call(ctx, payload, queue, next).await
            }
            None => Ok(self.perform.perform(ctx, payload).await?),
        }
    }
}

/// Ordered worker interceptors for one backend
pub struct WorkerChain {
    entries: Entries<dyn WorkerMiddleware>,
}

impl WorkerChain {
    pub fn new() -> Self {
        Self {
            entries: Entries::new(),
        }
    }

    /// Install an interceptor; installing the same type again replaces it
    pub fn add<M: WorkerMiddleware>(&self, middleware: M) {
        self.entries.add(TypeId::of::<M>(), Arc::new(middleware));
    }

    pub fn exists<M: WorkerMiddleware>(&self) -> bool {
        self.entries.exists(TypeId::of::<M>())
    }

    pub fn remove<M: WorkerMiddleware>(&self) -> bool {
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

    /// Run a fetched job through every interceptor and then `perform`
    pub async fn invoke(
        &self,
        ctx: &WorkerCtx,
        payload: &Map<String, Value>,
        queue: &str,
        perform: &dyn Perform,
    ) -> UniqueResult<()> {
        let chain = self.entries.snapshot();
        let next = WorkerNext {
            rest: &chain,
            perform,
        };
        next.run(ctx, payload, queue).await
    }
}

impl Default for WorkerChain {
    fn default() -> Self {
        Self::new()
    }
}
