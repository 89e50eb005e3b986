pub mod adapters;
pub mod contracts;
pub mod driver;
pub mod preview;

pub use adapters::*;
pub use contracts::*;
pub use driver::*;
pub use preview::*;
