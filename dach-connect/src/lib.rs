pub mod capabilities;
pub mod error;
pub mod handshake;
pub mod token;

pub use capabilities::*;
pub use error::*;
pub use handshake::*;
pub use token::*;
