pub mod actions;
mod conversations;
mod session;

pub use conversations::*;
pub use session::*;
