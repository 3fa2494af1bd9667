//! Loading-source adapters and decorators.

pub mod adapters;

pub use adapters::{CompactSource, FunctionsSource, GetMultiSource, MapSource, ValidatingSource};
