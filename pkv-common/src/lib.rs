// pkv-common - Wire protocol definitions for PipeKV
//
// This crate holds the RESP2 codec and the protocol vocabulary shared by the
// client and by any tooling that needs to speak the server side.

pub mod error;
pub mod keyword;
pub mod resp;

// Re-export for convenience
pub use error::*;
pub use keyword::*;
pub use resp::*;
