//! cas core library: route table, request authorization and merging, command
//! execution, and the HTTP gateway used by the `cas` binary.

pub mod command;
pub mod config;
pub mod exec;
pub mod gateway;
pub mod init;
