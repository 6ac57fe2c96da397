pub mod core;
pub mod io;
pub mod relay_server;

#[cfg(test)]
mod testing;
