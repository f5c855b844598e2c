mod base;
mod change_log;
mod connection;
mod replicator;
mod tables;

pub use base::*;
pub use change_log::*;
pub use connection::*;
pub use replicator::*;
pub use tables::*;
