pub mod viewer;

pub use viewer::{ViewerContext, NOT_AUTHENTICATED};
