pub mod health;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod messages;

pub use health::*;
pub use diagnostics::*;
pub use error::*;
pub use identity::*;
pub use messages::*;
