pub mod registry;

pub use registry::{Backend, BackendRegistry};
