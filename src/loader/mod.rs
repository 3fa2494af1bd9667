//! Source loaders: the bridge between cache storage and loading sources.

pub mod direct;
pub mod single_flight;

pub use direct::DirectLoader;
pub use single_flight::{SingleFlightLoader, SingleFlightLoaderBuilder};
