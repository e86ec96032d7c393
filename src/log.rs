//! Logging macros
//!
//! Every level forwards to `defmt` when the `defmt` feature is enabled.
//! Without it the macros only borrow their arguments, so values that are
//! logged but otherwise unused do not trigger warnings.

#[cfg(feature = "defmt")]
#[doc(hidden)]
#[macro_export]
macro_rules! __log_level {
    ($level:ident, $($arg:tt)*) => { defmt::$level!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __log_level {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        $( let _ = &$arg; )*
    }};
}

/// Trace message
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__log_level!(trace, $($arg)*) };
}

/// Debug message
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__log_level!(debug, $($arg)*) };
}

/// Info message
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__log_level!(info, $($arg)*) };
}

/// Warning message
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__log_level!(warn, $($arg)*) };
}

/// Error message
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__log_level!(error, $($arg)*) };
}
