//! Record representation and row-type registry
//!
//! Rust has no `interface{}`; the channel between the [`crate::loader`]
//! and [`crate::worker`] carries this enum instead, with a small
//! registry of named decode closures for dispatching a row type by name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// A typed structured/columnar record, downcastable to its concrete
/// row type by a [`crate::processor::Processor`] and marshalable back
/// to the on-wire line format for sink writes.
pub trait TypedRecord: Send + Sync + fmt::Debug {
    /// Marshal this record back to the on-wire line format used by the
    /// loader: structured records marshal to the same line format
    /// before writing to a sink.
    fn to_line(&self) -> Vec<u8>;

    /// Borrow this record as `dyn Any` so a processor can downcast to
    /// its concrete row type.
    fn as_any(&self) -> &dyn Any;
}

/// One unit of input presented to the user processor: a raw line, or
/// a decoded structured/columnar row.
#[derive(Clone, Debug)]
pub enum Record {
    /// A raw line or delimited record, verbatim bytes
    Line(Vec<u8>),
    /// A decoded structured or columnar row
    Typed(Arc<dyn TypedRecord>),
}

impl Record {
    /// The on-wire line representation of this record, used when
    /// writing to a sink.
    pub fn to_line(&self) -> Vec<u8> {
        match self {
            Record::Line(bytes) => bytes.clone(),
            Record::Typed(row) => row.to_line(),
        }
    }
}

/// A decode closure for one named row type: parses a single line into
/// a [`TypedRecord`].
pub type RowTypeDecoder = Arc<dyn Fn(&[u8]) -> Result<Arc<dyn TypedRecord>> + Send + Sync>;

/// Maps a declared row-type name to a decode closure, so a row type
/// can be selected dynamically by its configured name.
#[derive(Clone, Default)]
pub struct RowTypeRegistry {
    decoders: HashMap<String, RowTypeDecoder>,
}

impl RowTypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder under `name`, overwriting any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        decoder: impl Fn(&[u8]) -> Result<Arc<dyn TypedRecord>> + Send + Sync + 'static,
    ) {
        self.decoders.insert(name.into(), Arc::new(decoder));
    }

    /// Look up the decoder registered for `name`.
    pub fn get(&self, name: &str) -> Option<&RowTypeDecoder> {
        self.decoders.get(name)
    }

    /// Whether a decoder is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }
}

impl fmt::Debug for RowTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowTypeRegistry")
            .field("names", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}
