pub mod logging;

pub use logging::LoggingHelper;
