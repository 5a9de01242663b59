pub mod handshake;
pub mod session;
pub mod tls;

pub use handshake::*;
pub use session::*;
pub use tls::*;
