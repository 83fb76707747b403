pub mod cursor;
pub mod error;
pub mod messages;
pub mod room;

pub use cursor::*;
pub use error::*;
pub use messages::*;
pub use room::*;
