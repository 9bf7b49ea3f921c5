use std::sync::Arc;

use ojremote_types::{OperationType, names};

use crate::capability::Binding;
use crate::error::Result;
use crate::registry::{HandlerContext, HandlerFactory};
use crate::toolkit::ClientToolkit;

/// Resettable: soft reset clears an exception/incomplete state, hard reset
/// returns the job to ready regardless. Both report whether the job reset.
pub struct ResettableHandler {
    toolkit: ClientToolkit,
}

impl ResettableHandler {
    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        Ok(Binding::Resettable(Arc::new(ResettableHandler { toolkit: ctx.toolkit.clone() })))
    }

    pub async fn soft_reset(&self) -> Result<bool> {
        self.reset("softReset").await
    }

    pub async fn hard_reset(&self) -> Result<bool> {
        self.reset("hardReset").await
    }

    async fn reset(&self, name: &str) -> Result<bool> {
        let op = OperationType::new(name, names::BOOLEAN, Vec::<String>::new());
        self.toolkit.invoke(&op, Vec::new()).await
    }
}
