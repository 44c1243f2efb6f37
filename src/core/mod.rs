pub mod accumulator;
pub mod catalog;
pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod session;
