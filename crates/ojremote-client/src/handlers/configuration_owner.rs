//! ConfigurationOwner: read-only view of a job's configuration session.

use std::sync::Arc;

use ojremote_types::{OperationType, names};

use crate::capability::Binding;
use crate::error::Result;
use crate::registry::{HandlerContext, HandlerFactory, TypeDescriptor};
use crate::toolkit::ClientToolkit;

pub struct ConfigurationOwnerHandler {
    toolkit: ClientToolkit,
    string_array: TypeDescriptor,
}

impl ConfigurationOwnerHandler {
    pub(crate) fn factory() -> HandlerFactory {
        Arc::new(Self::bind)
    }

    fn bind(ctx: &HandlerContext<'_>) -> Result<Binding> {
        let string_array = ctx.types.for_type::<String>()?.array_of();
        Ok(Binding::ConfigurationOwner(Arc::new(ConfigurationOwnerHandler {
            toolkit: ctx.toolkit.clone(),
            string_array,
        })))
    }

    /// Tag of the configuration's root element, if it has one.
    pub async fn root_element(&self) -> Result<Option<String>> {
        let op = OperationType::new("rootElement", names::STRING, Vec::<String>::new());
        self.toolkit.invoke(&op, Vec::new()).await
    }

    /// Whether the configuration has unsaved edits.
    pub async fn is_modified(&self) -> Result<bool> {
        let op = OperationType::new("isModified", names::BOOLEAN, Vec::<String>::new());
        self.toolkit.invoke(&op, Vec::new()).await
    }

    /// Element tags that may be added under `parent`.
    pub async fn supported_elements(&self, parent: &str) -> Result<Vec<String>> {
        let op = OperationType::new("supportedElements", self.string_array.name(), [names::STRING]);
        let elements: Option<Vec<String>> = self.toolkit.invoke(&op, vec![parent.into()]).await?;
        Ok(elements.unwrap_or_default())
    }
}
