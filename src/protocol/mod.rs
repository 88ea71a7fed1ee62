//! Event bus wire protocol
//!
//! Frame types exchanged with the server-side event bus and the rules for
//! the endpoint URL the client connects to.

pub mod endpoint;
pub mod messages;

pub use endpoint::*;
pub use messages::*;
