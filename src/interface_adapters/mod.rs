pub mod auth_client;
pub mod memory;
pub mod shell;
