//! Capture and restore of page object inputs.
//!
//! [`capture`] turns the inputs a page object holds into a
//! [`SerializedInputSet`]: per input type a list of named parts, each
//! with a [`FormatTag`]. [`restore`] goes the other way and rebuilds the
//! page object through the registry, in a replay-only context.
//!
//! The per-type work is done by [`InputCodec`]s kept in a
//! [`CodecRegistry`]. Codecs for all built-in inputs are registered by
//! [`CodecRegistry::new`]; hosts add their own for custom input types.

mod builtin;
mod codec;
mod records;
pub mod store;

pub use builtin::{ClientCodec, ParamsCodec, RequestCodec, RequestUrlCodec, ResponseCodec, ResponseUrlCodec};
pub use codec::{CodecRegistry, InputCodec};
pub use records::{FormatTag, SerializedInput, SerializedInputSet, SerializedPart};
pub use store::{read_inputs, read_meta, write_inputs, FixtureMeta, InputManifest, PartManifest};

use std::sync::Arc;

use crate::config::CaptureConfig;
use crate::errors::{Error, SerializationError};
use crate::page::Injectable;
use crate::registry::{InputSet, Registry, ResolutionContext};

/// Serializes every input `page` holds.
pub fn capture<P: Injectable>(
    page: &P,
    codecs: &CodecRegistry,
    config: &CaptureConfig,
) -> Result<SerializedInputSet, SerializationError> {
    let inputs = page.inputs();
    let mut serialized = Vec::with_capacity(inputs.len());
    for (key, value) in inputs.iter() {
        let parts = codecs.capture(key, value, config)?;
        serialized.push(SerializedInput {
            type_name: key.name().to_string(),
            parts,
        });
    }
    log::debug!("Captured {} inputs of {}", serialized.len(), P::NAME);
    Ok(SerializedInputSet::new(serialized))
}

/// Decodes a serialized set back into input values.
pub fn restore_inputs(codecs: &CodecRegistry, set: &SerializedInputSet) -> Result<InputSet, SerializationError> {
    set.check_version()?;
    let mut inputs = InputSet::new();
    for input in &set.inputs {
        let (key, value) = codecs.restore(input)?;
        inputs.push(key, value);
    }
    Ok(inputs)
}

/// Rebuilds a page object from captured inputs. Registered providers are
/// not consulted, so the result never depends on live state.
pub async fn restore<P: Injectable>(
    registry: &Arc<Registry>,
    codecs: &CodecRegistry,
    set: &SerializedInputSet,
) -> Result<Arc<P>, Error> {
    let inputs = restore_inputs(codecs, set)?;
    let ctx = ResolutionContext::replay(registry.clone(), inputs);
    Ok(ctx.resolve::<P>().await?)
}
