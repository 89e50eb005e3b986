pub mod actions;
pub mod config;
pub mod error;
pub mod merge;
pub mod path;
pub mod persistence;
pub mod reducer;
pub mod response;
pub mod state;
pub mod store;
pub mod sync;
pub mod tree;
pub mod workspace;

pub use actions::*;
pub use error::*;
pub use reducer::*;
pub use state::*;
pub use store::*;
pub use workspace::*;
