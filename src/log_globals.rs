//! Global log stream and logger instances.

use crate::logging::{LogStream, RingLogger};

/// Log stream fed by every context, drained by the main loop.
pub static LOG_STREAM: LogStream = LogStream::new();

/// Logger installed by [`crate::logging::init`].
pub static LOGGER: RingLogger = RingLogger::new(&LOG_STREAM);
