pub mod bootstrap;
pub mod chat;
pub mod init;
pub mod serve;
pub mod tools;
