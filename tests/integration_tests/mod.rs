#[cfg(unix)]
pub mod cli;
pub mod fallback;
#[cfg(unix)]
pub mod server_client;
