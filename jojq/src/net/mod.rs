pub mod acceptor;
pub mod headers;
pub mod mitm;
pub mod plain;
pub mod tunnel;
