//! Tool invocation wrapper
//!
//! Runs an operation, and on failure asks the resolver for a fix, applies
//! it when auto-appliable and retries the operation once. The caller always
//! gets back the operation's own result type: either the retry's success or
//! the original failure.

use crate::resolver::ConfidenceCascadeResolver;
use crate::tools::apply::{extract_command, ApplyOutcome, FixApplier, ShellApplier, DEFAULT_APPLY_TIMEOUT};
use crate::tools::types::ToolOutcome;
use crate::types::{Resolution, ToolCall};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runtime settings for the wrapper
#[derive(Debug, Clone)]
pub struct WrapperConfig {
    /// When false, fixes are resolved but never executed
    pub apply_enabled: bool,
    pub apply_timeout: Duration,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            apply_enabled: true,
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
        }
    }
}

/// Guards tool invocations with resolve, apply and a single retry
#[derive(Clone)]
pub struct ToolInvocationWrapper {
    resolver: Arc<ConfidenceCascadeResolver>,
    applier: Arc<dyn FixApplier>,
    config: WrapperConfig,
}

impl ToolInvocationWrapper {
    /// Wrapper applying fixes through the shell with default settings
    pub fn new(resolver: Arc<ConfidenceCascadeResolver>) -> Self {
        Self::with_applier(resolver, Arc::new(ShellApplier::new()), WrapperConfig::default())
    }

    pub fn with_applier(
        resolver: Arc<ConfidenceCascadeResolver>,
        applier: Arc<dyn FixApplier>,
        config: WrapperConfig,
    ) -> Self {
        Self {
            resolver,
            applier,
            config,
        }
    }

    pub fn resolver(&self) -> &Arc<ConfidenceCascadeResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    /// Bind an operation to this wrapper; `call()` on the result has the
    /// operation's own output type
    pub fn wrap<F, Fut, O>(&self, call: ToolCall, operation: F) -> WrappedOperation<'_, F>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = O>,
        O: ToolOutcome,
    {
        WrappedOperation {
            wrapper: self,
            call,
            operation,
        }
    }

    /// Run `operation` once under the wrapper
    pub async fn invoke<F, Fut, O>(&self, call: &ToolCall, operation: F) -> O
    where
        F: Fn() -> Fut,
        Fut: Future<Output = O>,
        O: ToolOutcome,
    {
        let original = operation().await;
        let Some(failure) = original.failure() else {
            return original;
        };

        debug!("{} failed: {}", call.tool, failure.message);
        let context = call.error_context(failure.message.clone());
        let resolution = self.resolver.resolve_error(&failure.message, &context).await;

        let Some(command) = self.applicable_command(&resolution) else {
            return original;
        };

        if !self.config.apply_enabled {
            info!("Dry run, not applying fix for {}: {}", call.tool, command);
            return original;
        }

        let outcome = self.applier.apply(&command, self.config.apply_timeout).await;
        if !outcome.is_success() {
            warn!("Fix for {} did not apply: {}", call.tool, describe(&outcome));
            self.resolver.record_apply_outcome(false);
            self.resolver.record_recovery(false);
            return original;
        }

        let retry = operation().await;
        match retry.failure() {
            None => {
                info!("{} recovered after applying: {}", call.tool, command);
                self.resolver.record_apply_outcome(true);
                self.resolver.record_recovery(true);
                retry
            }
            Some(again) => {
                warn!("{} still failing after fix: {}", call.tool, again.message);
                self.resolver.record_apply_outcome(false);
                self.resolver.record_recovery(false);
                original
            }
        }
    }

    /// Command to execute for an auto-appliable resolution, if any
    fn applicable_command(&self, resolution: &Resolution) -> Option<String> {
        if !resolution.is_auto_appliable() {
            debug!(
                "{} resolution is not auto-appliable, returning original failure",
                resolution.tier
            );
            return None;
        }

        let solution = resolution.solution.as_deref()?;
        let Some(command) = extract_command(solution) else {
            warn!("Auto-applied solution has no runnable command");
            return None;
        };

        if let Some(rule) = self.resolver.safety_filter().check(&command) {
            warn!("Refusing to execute fix matching safety rule '{}'", rule);
            return None;
        }

        Some(command)
    }
}

/// An operation bound to a wrapper and a tool description
pub struct WrappedOperation<'a, F> {
    wrapper: &'a ToolInvocationWrapper,
    call: ToolCall,
    operation: F,
}

impl<'a, F> WrappedOperation<'a, F> {
    /// Invoke the guarded operation
    pub async fn call<Fut, O>(&self) -> O
    where
        F: Fn() -> Fut,
        Fut: Future<Output = O>,
        O: ToolOutcome,
    {
        self.wrapper.invoke(&self.call, &self.operation).await
    }

    pub fn tool_call(&self) -> &ToolCall {
        &self.call
    }
}

fn describe(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Succeeded => "succeeded".to_string(),
        ApplyOutcome::Failed { exit_code, stderr } => match exit_code {
            Some(code) => format!("exit code {}: {}", code, stderr.trim()),
            None => format!("terminated: {}", stderr.trim()),
        },
        ApplyOutcome::TimedOut => "timed out".to_string(),
        ApplyOutcome::SpawnFailed(e) => format!("spawn failed: {}", e),
    }
}
