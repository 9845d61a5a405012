use async_trait::async_trait;
use tracing::warn;

use crate::application::execution::context::{ExecutionContext, ExecutionOutcome, HandlerOutcome};

/// One link in the execution chain. `process` never sees the rest of the
/// chain; `ExecutionPipeline::run` stops at the first `Failure`.
/// Grounded on `execution/handlers/base.py`'s `ExecutionHandler`.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, ctx: &mut ExecutionContext) -> ExecutionOutcome;
}

/// Fixed ordered chain: validation, risk/sizing, order placement,
/// reconciliation. Short-circuits on the first handler failure.
pub struct ExecutionPipeline {
    handlers: Vec<Box<dyn ExecutionHandler>>,
}

impl ExecutionPipeline {
    pub fn new(handlers: Vec<Box<dyn ExecutionHandler>>) -> Self {
        Self { handlers }
    }

    /// Returns `Ok(())` if every handler succeeded; `Err(reason)` from the
    /// first handler that failed, with the context's log reflecting the
    /// full attempted chain up to that point.
    pub async fn run(&self, ctx: &mut ExecutionContext) -> Result<(), String> {
        for handler in &self.handlers {
            match handler.process(ctx).await {
                ExecutionOutcome::Success => {
                    ctx.log(handler.name(), HandlerOutcome::Success, "ok");
                }
                ExecutionOutcome::Failure(reason) => {
                    ctx.log(handler.name(), HandlerOutcome::Failure, reason.clone());
                    warn!(handler = handler.name(), reason = %reason, "execution pipeline short-circuited");
                    return Err(reason);
                }
            }
        }
        Ok(())
    }
}
