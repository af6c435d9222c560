use std::collections::HashMap;
use std::sync::Arc;

use super::builtin;
use super::records::{SerializedInput, SerializedPart};
use crate::config::CaptureConfig;
use crate::errors::SerializationError;
use crate::registry::{AnyArc, Capability, TypeKey};

/// Converts one input type to and from its on-disk parts.
///
/// `restore(capture(x))` must be observably equal to `x`.
pub trait InputCodec: Send + Sync + 'static {
    type Input: Capability;

    fn capture(&self, input: &Self::Input, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError>;

    fn restore(&self, input: &SerializedInput) -> Result<Self::Input, SerializationError>;
}

/// Object safe view of an [`InputCodec`].
trait ErasedCodec: Send + Sync {
    fn capture(&self, value: &AnyArc, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError>;
    fn restore(&self, input: &SerializedInput) -> Result<AnyArc, SerializationError>;
}

impl<C: InputCodec> ErasedCodec for C {
    fn capture(&self, value: &AnyArc, config: &CaptureConfig) -> Result<Vec<SerializedPart>, SerializationError> {
        let input = value
            .downcast_ref::<C::Input>()
            .ok_or_else(|| SerializationError::UnsupportedInputType(C::Input::NAME.to_string()))?;
        InputCodec::capture(self, input, config)
    }

    fn restore(&self, input: &SerializedInput) -> Result<AnyArc, SerializationError> {
        let value: AnyArc = Arc::new(InputCodec::restore(self, input)?);
        Ok(value)
    }
}

/// Codecs by input type, and by type name for the way back from disk.
#[derive(Clone)]
pub struct CodecRegistry {
    by_key: HashMap<TypeKey, Arc<dyn ErasedCodec>>,
    by_name: HashMap<&'static str, TypeKey>,
}

impl CodecRegistry {
    /// A registry with codecs for every built-in input type.
    pub fn new() -> Self {
        let mut codecs = Self::empty();
        builtin::register_all(&mut codecs);
        codecs
    }

    pub fn empty() -> Self {
        Self {
            by_key: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Adds or replaces the codec for `C::Input`.
    pub fn register<C: InputCodec>(&mut self, codec: C) -> &mut Self {
        let key = TypeKey::of::<C::Input>();
        self.by_key.insert(key, Arc::new(codec));
        self.by_name.insert(key.name(), key);
        self
    }

    pub fn supports(&self, key: TypeKey) -> bool {
        self.by_key.contains_key(&key)
    }

    pub(crate) fn capture(
        &self,
        key: TypeKey,
        value: &AnyArc,
        config: &CaptureConfig,
    ) -> Result<Vec<SerializedPart>, SerializationError> {
        let codec = self
            .by_key
            .get(&key)
            .ok_or_else(|| SerializationError::UnsupportedInputType(key.name().to_string()))?;
        codec.capture(value, config)
    }

    pub(crate) fn restore(&self, input: &SerializedInput) -> Result<(TypeKey, AnyArc), SerializationError> {
        let key = *self
            .by_name
            .get(input.type_name.as_str())
            .ok_or_else(|| SerializationError::UnsupportedInputType(input.type_name.clone()))?;
        let codec = self
            .by_key
            .get(&key)
            .ok_or_else(|| SerializationError::UnsupportedInputType(input.type_name.clone()))?;
        Ok((key, codec.restore(input)?))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
