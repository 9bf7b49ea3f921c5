use std::sync::Arc;

use ojremote_types::{OperationType, names};

use crate::capability::Binding;
use crate::error::Result;
use crate::registry::{HandlerContext, HandlerFactory};
use crate::toolkit::ClientToolkit;

/// Runnable: start the remote job.
pub struct RunnableHandler {
    toolkit: ClientToolkit,
}

impl RunnableHandler {
    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        Ok(Binding::Runnable(Arc::new(RunnableHandler { toolkit: ctx.toolkit.clone() })))
    }

    pub async fn run(&self) -> Result<()> {
        let op = OperationType::new("run", names::VOID, Vec::<String>::new());
        self.toolkit.invoke(&op, Vec::new()).await
    }
}
