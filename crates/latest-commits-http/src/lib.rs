pub mod transport;

pub use transport::{DEFAULT_TIMEOUT, HttpTransport};
