//! # Kernel Diagnostic Console
//!
//! Text output for kernel subsystems that have nothing but a character device
//! to talk to: a memory-mapped text display, a serial line, or QEMU's debug
//! port.
//!
//! ## Overview
//!
//! The crate separates *what* is written from *where* it ends up:
//!
//! ```text
//! log::info!(...)            subsystem code (e.g. frame pools)
//!        ↓                          ↓
//! ConsoleLogger<S>           DiagnosticSink::write_text / write_decimal
//!        ↓                          ↓
//! SinkWriter (fmt::Write) ──► S: DiagnosticSink
//!                                   ↓
//!                    QemuDebugSink / VGA console / test buffer
//! ```
//!
//! ### Diagnostic Sink ([`DiagnosticSink`])
//! The only capability a backend must provide is writing text; writing an
//! unsigned integer in decimal is derived from it through `core::fmt`, so no
//! number formatting code lives in the backends.
//!
//! ### Console Logger ([`ConsoleLogger`])
//! A `log::Log` implementation routing records into any sink, formatted as
//! `"[LEVEL] target: message\n"`.
//!
//! ### QEMU Debug Port ([`QemuDebugSink`], feature `qemu`)
//! Writes every byte to I/O port `0x402`; capture it on the host with
//! `qemu-system-x86_64 ... -debugcon stdio`.
//!
//! ## Usage
//! ```rust,ignore
//! use kernel_console::{ConsoleLogger, QemuDebugSink};
//! use log::LevelFilter;
//!
//! static LOGGER: ConsoleLogger<QemuDebugSink> =
//!     ConsoleLogger::new(QemuDebugSink, LevelFilter::Debug);
//!
//! LOGGER.install().expect("logger initialization");
//! log::info!("console online");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

use core::fmt::{self, Write};

pub use logger::ConsoleLogger;

/// A text-output collaborator for diagnostics.
///
/// Methods take `&self`: sinks are typically stateless port writers or wrap
/// their own interior state, so they can be shared by a `'static` logger.
pub trait DiagnosticSink {
    /// Write a string verbatim.
    fn write_text(&self, text: &str);

    /// Write an unsigned integer in decimal.
    fn write_decimal(&self, value: u64) {
        // Writing into a sink cannot fail.
        let _ = write!(SinkWriter::new(self), "{value}");
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    #[inline]
    fn write_text(&self, text: &str) {
        (**self).write_text(text);
    }

    #[inline]
    fn write_decimal(&self, value: u64) {
        (**self).write_decimal(value);
    }
}

/// Adapts a [`DiagnosticSink`] to [`core::fmt::Write`].
pub struct SinkWriter<'a, S: ?Sized> {
    sink: &'a S,
}

impl<'a, S: DiagnosticSink + ?Sized> SinkWriter<'a, S> {
    #[inline]
    #[must_use]
    pub const fn new(sink: &'a S) -> Self {
        Self { sink }
    }
}

impl<S: DiagnosticSink + ?Sized> Write for SinkWriter<'_, S> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.write_text(s);
        Ok(())
    }
}

/// Format `args` into `sink`, best effort.
#[inline]
pub fn write_fmt<S: DiagnosticSink + ?Sized>(sink: &S, args: fmt::Arguments) {
    let _ = fmt::write(&mut SinkWriter::new(sink), args);
}

#[cfg(all(feature = "qemu", target_arch = "x86_64"))]
pub use qemu::QemuDebugSink;

#[cfg(all(feature = "qemu", target_arch = "x86_64"))]
mod qemu {
    use crate::DiagnosticSink;

    /// The port number for QEMU's debug port.
    const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Sink writing to QEMU's `-debugcon` port.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct QemuDebugSink;

    impl QemuDebugSink {
        /// Write a single byte to QEMU's debug port.
        #[allow(clippy::inline_always)]
        #[inline(always)]
        pub fn putc(self, c: u8) {
            unsafe { outb(QEMU_DEBUG_PORT, c) }
        }
    }

    impl DiagnosticSink for QemuDebugSink {
        #[inline]
        fn write_text(&self, text: &str) {
            for b in text.bytes() {
                self.putc(b);
            }
        }
    }

    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn outb(port: u16, val: u8) {
        unsafe {
            core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nomem, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Buffer(Mutex<String>);

    impl DiagnosticSink for Buffer {
        fn write_text(&self, text: &str) {
            self.0.lock().unwrap().push_str(text);
        }
    }

    #[test]
    fn decimal_output() {
        let b = Buffer::default();
        b.write_text("free: ");
        b.write_decimal(1023);
        b.write_text(", zero: ");
        b.write_decimal(0);
        b.write_text(", max: ");
        b.write_decimal(u64::MAX);
        assert_eq!(
            b.0.lock().unwrap().as_str(),
            "free: 1023, zero: 0, max: 18446744073709551615"
        );
    }

    #[test]
    fn sink_by_reference_and_fmt() {
        let b = Buffer::default();
        let r = &b;
        r.write_decimal(7);
        write_fmt(&r, format_args!(" frames at {:#x}", 0x2000));
        assert_eq!(b.0.lock().unwrap().as_str(), "7 frames at 0x2000");
    }
}
