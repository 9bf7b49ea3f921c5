use std::sync::Arc;

use ojremote_types::{OperationType, names};

use crate::capability::Binding;
use crate::error::Result;
use crate::registry::{HandlerContext, HandlerFactory};
use crate::toolkit::ClientToolkit;

/// Object: methods every remote object has. Used for display labels.
pub struct ObjectHandler {
    toolkit: ClientToolkit,
}

impl ObjectHandler {
    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        Ok(Binding::Object(Arc::new(ObjectHandler { toolkit: ctx.toolkit.clone() })))
    }

    /// The remote `toString`.
    pub async fn to_display_string(&self) -> Result<String> {
        let op = OperationType::new("toString", names::STRING, Vec::<String>::new());
        self.toolkit.invoke(&op, Vec::new()).await
    }
}
