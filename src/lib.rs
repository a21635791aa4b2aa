pub mod api;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod restore;
pub mod sensors;
pub mod service;
