pub mod classifier;

pub use classifier::{classify, AddressFamily};
