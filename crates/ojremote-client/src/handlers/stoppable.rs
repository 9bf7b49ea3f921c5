use std::sync::Arc;

use ojremote_types::{OperationType, names};

use crate::capability::Binding;
use crate::error::Result;
use crate::registry::{HandlerContext, HandlerFactory};
use crate::toolkit::ClientToolkit;

/// Stoppable: ask the remote job to stop.
pub struct StoppableHandler {
    toolkit: ClientToolkit,
}

impl StoppableHandler {
    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        Ok(Binding::Stoppable(Arc::new(StoppableHandler { toolkit: ctx.toolkit.clone() })))
    }

    pub async fn stop(&self) -> Result<()> {
        let op = OperationType::new("stop", names::VOID, Vec::<String>::new());
        self.toolkit.invoke(&op, Vec::new()).await
    }
}
