//! CLI commands implementation

pub mod chunks;
pub mod init;
pub mod knowledge;
pub mod pdf;
pub mod query;
pub mod status;

pub use chunks::*;
pub use init::*;
pub use knowledge::*;
pub use pdf::*;
pub use query::*;
pub use status::*;
