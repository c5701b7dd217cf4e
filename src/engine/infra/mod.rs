//! Process infrastructure shared by the library and the binary.

mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
