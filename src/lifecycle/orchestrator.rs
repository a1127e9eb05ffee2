use std::any::Any;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::{
    AcquireData, ConfigureData, EnvParam, LifecycleError, Phase, PhaseError, ResourceState,
    ShutdownData,
};
use crate::decode::{deref_all, FieldDecl, FieldInspector, Inspect, Record};
use crate::error::{BoxError, MultiError};
use crate::registry::{Kind, TypeDescriptor};

struct Resource<'a> {
    key: String,
    type_name: &'static str,
    param: &'a dyn EnvParam,
    state: ResourceState,
}

impl Resource<'_> {
    fn failure(&self, phase: Phase, source: BoxError) -> PhaseError {
        PhaseError {
            phase,
            key: self.key.clone(),
            type_name: self.type_name,
            source,
        }
    }
}

/// Drives the resource parameters of one decoded record through their lifecycle.
///
/// Parameters are kept in discovery order. Acquisition follows that order and
/// every release (regular shutdown or rollback) runs in reverse.
#[derive(Default)]
pub struct Orchestrator<'a> {
    resources: Vec<Resource<'a>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every resource parameter reachable from `record`, in field order.
    ///
    /// Nested records are searched through any number of non-empty pointer layers.
    /// Sequences and maps are not searched.
    pub fn discover<R: Record>(record: &'a R) -> Self {
        Self::discover_with_prefix(record, "")
    }

    /// Like [`discover`](Self::discover), with every key starting with `prefix`,
    /// the same prefix the record was decoded with.
    pub fn discover_with_prefix<R: Record>(record: &'a R, prefix: &str) -> Self {
        let mut orchestrator = Self::new();
        let mut discovery = Discovery {
            prefix: prefix.to_string(),
            found: &mut orchestrator.resources,
        };
        record.inspect_fields(&mut Inspect::new(&mut discovery));
        debug!(
            record = std::any::type_name::<R>(),
            prefix,
            resources = orchestrator.resources.len(),
            "Discovered resource parameters"
        );
        orchestrator
    }

    /// Registers a resource parameter by hand, after the discovered ones.
    pub fn push<P: EnvParam>(&mut self, key: impl Into<String>, param: &'a P) -> &mut Self {
        self.resources.push(Resource {
            key: key.into(),
            type_name: std::any::type_name::<P>(),
            param,
            state: ResourceState::Unconfigured,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|resource| resource.key.as_str())
    }

    pub fn states(&self) -> Vec<(&str, ResourceState)> {
        self.resources
            .iter()
            .map(|resource| (resource.key.as_str(), resource.state))
            .collect()
    }

    /// Configures every parameter. Failures are collected across all of them.
    pub async fn configure(
        &mut self,
        ctx: &CancellationToken,
        data: &ConfigureData,
    ) -> Result<(), LifecycleError> {
        let span = data.span.clone();
        async {
            let mut errors = MultiError::new();
            for resource in &mut self.resources {
                match resource.param.configure(ctx, data).await {
                    Ok(()) => {
                        resource.state = ResourceState::Configured;
                        debug!(key = %resource.key, type_name = resource.type_name, "Configured");
                    }
                    Err(source) => {
                        warn!(key = %resource.key, error = %source, "Configure failed");
                        errors.push(resource.failure(Phase::Configure, source));
                    }
                }
            }
            errors.into_result().map_err(LifecycleError::Configure)
        }
        .instrument(span)
        .await
    }

    /// Acquires every parameter in discovery order.
    ///
    /// Stops at the first failure and shuts down, in reverse order, every parameter
    /// acquired so far. Parameters after the failing one are left untouched.
    pub async fn acquire(
        &mut self,
        ctx: &CancellationToken,
        data: &AcquireData,
    ) -> Result<(), LifecycleError> {
        if let Some(resource) = self
            .resources
            .iter()
            .find(|resource| resource.state != ResourceState::Configured)
        {
            return Err(LifecycleError::NotConfigured {
                key: resource.key.clone(),
            });
        }

        let span = data.span.clone();
        async {
            for index in 0..self.resources.len() {
                let resource = &mut self.resources[index];
                match resource.param.acquire(ctx, data).await {
                    Ok(()) => {
                        resource.state = ResourceState::Acquired;
                        info!(key = %resource.key, type_name = resource.type_name, "Acquired");
                    }
                    Err(source) => {
                        error!(key = %resource.key, error = %source, "Acquire failed, rolling back");
                        let failed = resource.failure(Phase::Acquire, source);
                        let shutdown = data.clone().into_shutdown();
                        let rollback = self.release(ctx, &shutdown).await;
                        return Err(LifecycleError::Acquire { failed, rollback });
                    }
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Shuts down every acquired parameter in reverse order.
    pub async fn shutdown(
        &mut self,
        ctx: &CancellationToken,
        data: &ShutdownData,
    ) -> Result<(), LifecycleError> {
        let span = data.span.clone();
        self.release(ctx, data)
            .instrument(span)
            .await
            .into_result()
            .map_err(LifecycleError::Shutdown)
    }

    async fn release(
        &mut self,
        ctx: &CancellationToken,
        data: &ShutdownData,
    ) -> MultiError<PhaseError> {
        let mut errors = MultiError::new();
        for resource in self.resources.iter_mut().rev() {
            if resource.state != ResourceState::Acquired {
                continue;
            }
            resource.state = ResourceState::ShuttingDown;
            let result = resource.param.shutdown(ctx, data).await;
            resource.state = ResourceState::Closed;
            match result {
                Ok(()) => info!(key = %resource.key, type_name = resource.type_name, "Released"),
                Err(source) => {
                    warn!(key = %resource.key, error = %source, "Shutdown failed");
                    errors.push(resource.failure(Phase::Shutdown, source));
                }
            }
        }
        errors
    }

    /// Configure, acquire, run `action`, shut down.
    ///
    /// Shutdown gets its own token: a cancelled `ctx` ends the action but must not
    /// cut the release of resources short.
    pub async fn run<F, Fut, T>(
        mut self,
        ctx: &CancellationToken,
        data: ConfigureData,
        action: F,
    ) -> Result<T, LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // 1. Configure everything before touching any resource
        self.configure(ctx, &data).await?;

        // 2. Acquire, rolling back on failure
        let data = data.into_acquire();
        self.acquire(ctx, &data).await?;

        // 3. Run the action
        let output = action().await;

        // 4. Release
        let data = data.into_shutdown();
        self.shutdown(&CancellationToken::new(), &data).await?;
        Ok(output)
    }
}

impl std::fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.states()).finish()
    }
}

/// Read-only walk registering every lifecycle-capable field value.
struct Discovery<'a, 'o> {
    prefix: String,
    found: &'o mut Vec<Resource<'a>>,
}

impl<'a> Discovery<'a, '_> {
    fn visit(&mut self, decl: &FieldDecl, ty: &TypeDescriptor, value: &'a dyn Any) {
        let spec = decl.resolve(&self.prefix);
        if spec.ignored {
            return;
        }
        let Some(value) = deref_all(ty, value) else {
            return;
        };

        let base = ty.base();
        if let Some(param) = base.as_resource(value) {
            self.found.push(Resource {
                key: spec.key,
                type_name: base.name(),
                param,
                state: ResourceState::Unconfigured,
            });
            return;
        }
        if let Kind::Record(shape) = base.kind() {
            let parent = std::mem::replace(&mut self.prefix, spec.group_prefix);
            (shape.inspect)(value, self);
            self.prefix = parent;
        }
    }
}

impl<'a> FieldInspector<'a> for Discovery<'a, '_> {
    fn inspect(&mut self, decl: &FieldDecl, ty: &TypeDescriptor, value: &'a dyn Any) {
        self.visit(decl, ty, value);
    }
}
