//! General purpose macros for text output.
//!
//! The writer pushes bytes straight through `libc::write` on the standard
//! error descriptor. The log path must never allocate: the allocator cannot
//! re-enter itself while reporting on its own arena.

use core::fmt;
use core::fmt::Write;

struct RawStderr;

impl fmt::Write for RawStderr {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut bytes = s.as_bytes();

        while !bytes.is_empty() {
            let written = unsafe {
                libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len())
            };
            if written <= 0 {
                return Err(fmt::Error);
            }
            bytes = &bytes[written as usize..];
        }

        Ok(())
    }
}

/// Writes a raw string to the output.
pub fn print(s: &str) {
    let _ = RawStderr.write_str(s);
}

/// Writes formatted arguments to the output.
pub fn arg_print(args: fmt::Arguments) {
    let _ = RawStderr.write_fmt(args);
}

/// Prints a standard information message to the output.
///
/// You can specify a 'context' as the first argument when calling the macro,
/// which will be inserted at the beginning of the message.
///
/// # Examples
///
/// ```
/// use smalloc::info;
///
/// info!("smalloc", "arena online");
/// ```
#[macro_export]
macro_rules! info {
    // A context was provided, so we insert it at the beginning of
    // the message.
    ($ctx: literal, $($arg: tt)*) => {{
        $crate::log::print("[info] ");
        $crate::log::print($ctx);
        $crate::log::print(" : ");
        $crate::log::arg_print(format_args!($($arg)*));
        $crate::log::print("\n");
    }};
    ($($arg: tt)*) => {{
        $crate::log::print("[info] ");
        $crate::log::arg_print(format_args!($($arg)*));
        $crate::log::print("\n");
    }};
}

/// Prints a standard error message to the output.
///
/// You can specify a 'context' as the first argument when calling the macro,
/// which will be inserted at the beginning of the error message.
///
/// # Examples
///
/// ```
/// use smalloc::error;
///
/// error!("smalloc", "heap extension refused");
/// ```
#[macro_export]
macro_rules! error {
    // A context was provided, so we insert it at the beginning of
    // the message.
    ($ctx: literal, $($arg: tt)*) => {{
        $crate::log::print("[error] ");
        $crate::log::print($ctx);
        $crate::log::print(" : ");
        $crate::log::arg_print(format_args!($($arg)*));
        $crate::log::print("\n");
    }};
    ($($arg: tt)*) => {{
        $crate::log::print("[error] ");
        $crate::log::arg_print(format_args!($($arg)*));
        $crate::log::print("\n");
    }};
}
