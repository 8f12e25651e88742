//! Kernel console for driver diagnostics
//!
//! Driver code logs through [`kprint!`] and [`kprintln!`]. The board code
//! installs a sink (usually the debug UART writer) with [`set_sink`]; until
//! then output is counted and discarded so early attach messages never fault.

use core::fmt::{self, Write};
use lazy_static::lazy_static;
use spin::Mutex;

lazy_static! {
    pub static ref CONSOLE: Mutex<Console> = Mutex::new(Console::new());
}

/// Console state: the installed output sink and a count of dropped writes
pub struct Console {
    sink: Option<&'static mut (dyn Write + Send)>,
    dropped: usize,
}

impl Console {
    const fn new() -> Self {
        Self {
            sink: None,
            dropped: 0,
        }
    }

    /// Number of messages discarded because no sink was installed
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self.sink.as_mut() {
            Some(sink) => sink.write_str(s),
            None => {
                self.dropped += 1;
                Ok(())
            }
        }
    }
}

/// Install the console output sink
///
/// Replaces any previously installed sink.
pub fn set_sink(sink: &'static mut (dyn Write + Send)) {
    CONSOLE.lock().sink = Some(sink);
}

/// Print implementation that acquires the console lock
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // A failing sink must not take the driver down with it
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Print macro for console output
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

/// Println macro for console output
#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_without_sink_counts_drops() {
        let before = CONSOLE.lock().dropped();
        kprintln!("[TEST] no sink installed");
        assert!(CONSOLE.lock().dropped() > before);
    }
}
