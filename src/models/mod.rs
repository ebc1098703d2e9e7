//! Request and response models

pub mod catalog;
pub mod detection;
pub mod zombie;

pub use catalog::*;
pub use detection::*;
pub use zombie::*;
