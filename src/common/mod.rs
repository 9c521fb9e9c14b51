//! Miscellaneous common structs used throughout the library.

mod id;
mod messages;
mod node;

pub use id::*;
pub use messages::*;
pub use node::*;
