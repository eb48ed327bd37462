pub mod catalog;

pub use catalog::{descriptor, supported_chains, ChainDescriptor, CHAINS};
