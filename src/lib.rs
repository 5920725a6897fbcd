pub mod barcode;
pub mod cli;
pub mod io;
pub mod whitelist;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
