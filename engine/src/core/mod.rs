pub mod logger;
pub mod signal;

pub use signal::{CancelToken, Latch};
