//! Publisher and persister roles built on top of `postmesh-network`.

pub mod publisher;
pub mod receiver;
pub mod source;
pub mod store;
