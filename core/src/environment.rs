//! Wiring of registry, scheduler and config into request objects.
//!
//! # Design
//! This is the only place that reaches for process-wide defaults: the global
//! `HandlerRegistry` and the thread's default `TaskQueue`, and only through
//! `MockEnvironment::default()`. Tests that want isolation build their own
//! environment and every request it creates shares that environment's
//! collaborators.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::XhrConfig;
use crate::error::XhrError;
use crate::handler::{Handler, HandlerRegistry};
use crate::http::HttpRequest;
use crate::response::ResponseBuilder;
use crate::scheduler::{Scheduler, TaskQueue};
use crate::xhr::MockXhr;

#[derive(Clone)]
pub struct MockEnvironment {
    registry: Arc<HandlerRegistry>,
    scheduler: Rc<dyn Scheduler>,
    config: XhrConfig,
}

impl Default for MockEnvironment {
    fn default() -> Self {
        Self::new(
            HandlerRegistry::global(),
            Rc::new(TaskQueue::thread_default()),
        )
    }
}

impl MockEnvironment {
    pub fn new(registry: Arc<HandlerRegistry>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            registry,
            scheduler,
            config: XhrConfig::default(),
        }
    }

    /// Fresh registry, driven by `queue`.
    pub fn isolated(queue: &TaskQueue) -> Self {
        Self::new(Arc::new(HandlerRegistry::new()), Rc::new(queue.clone()))
    }

    pub fn with_config(mut self, config: XhrConfig) -> Self {
        self.config = config;
        self
    }

    /// A new request object bound to this environment.
    pub fn create(&self) -> MockXhr {
        MockXhr::with_parts(self.registry.clone(), self.scheduler.clone(), &self.config)
    }

    pub fn add_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn(&HttpRequest, ResponseBuilder) -> Option<ResponseBuilder> + Send + Sync + 'static,
    {
        self.registry.add_handler(handler);
        self
    }

    pub fn remove_handler(&self, handler: &Handler) -> Result<&Self, XhrError> {
        self.registry.remove_handler(handler)?;
        Ok(self)
    }

    pub fn reset_handlers(&self) {
        self.registry.reset();
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &XhrConfig {
        &self.config
    }
}

impl fmt::Debug for MockEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEnvironment")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
