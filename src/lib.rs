//! pcc: a printable character counting service.
//!
//! Clients send a length-prefixed byte stream; the server replies with the
//! number of printable ASCII bytes (32..=126) in it and keeps a histogram of
//! every printable character seen across all completed connections. The
//! histogram is printed when the server is interrupted.
//!
//! Clients are served strictly one at a time. An interrupt never cuts an
//! in-progress connection short: the report waits until that connection's
//! result has been sent and its counts merged.

pub mod client;
pub mod config;
pub mod connection;
pub mod counter;
pub mod error;
pub mod histogram;
pub mod protocol;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use error::ServerError;
pub use histogram::Histogram;
pub use server::Server;
pub use shutdown::Shutdown;
