pub mod build;
pub mod health;

pub use build::*;
pub use health::*;
