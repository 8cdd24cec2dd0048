use crate::errors::MediaError;
use crate::resource::extension_of;
use async_trait::async_trait;
use std::sync::Arc;

/// Anything that can hand over a named, typed byte buffer.
#[async_trait]
pub trait InputDescriptor: Send + Sync {
    fn name(&self) -> &str;

    /// Declared media type, e.g. `image/png`. May be empty.
    fn declared_type(&self) -> &str;

    async fn read_bytes(&self) -> Result<Arc<[u8]>, MediaError>;

    fn extension(&self) -> String {
        extension_of(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryInput {
    name: String,
    declared_type: String,
    bytes: Arc<[u8]>,
}

impl InMemoryInput {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl InputDescriptor for InMemoryInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_type(&self) -> &str {
        &self.declared_type
    }

    async fn read_bytes(&self) -> Result<Arc<[u8]>, MediaError> {
        Ok(Arc::clone(&self.bytes))
    }
}
