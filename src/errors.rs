//! Fatal-error path for states assumed impossible.

use core::fmt;

/// Logs the message and terminates the process.
///
/// Reserved for internal invariant violations; anything a caller could
/// plausibly trigger gets a `Result` or a trap instead.
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    log::error!("fatal error: {args}");
    eprintln!("fatal error: {args}");
    std::process::abort()
}

#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::errors::fatal(core::format_args!($($arg)*))
    };
}
