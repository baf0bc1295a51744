//! Pool introspection.

use crate::registry::PoolRegistry;
use core::fmt;
use kernel_console::DiagnosticSink;
use kernel_memory_addresses::FrameNumber;

/// Point-in-time snapshot of one pool's counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolSummary {
    pub first_frame: FrameNumber,
    /// Inclusive.
    pub last_frame: FrameNumber,
    pub total: usize,
    pub free: usize,
    pub used: usize,
    pub info_frame: FrameNumber,
    pub info_frames: usize,
}

impl fmt::Display for PoolSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames {}..={} ({} total, {} free, {} used), {} info frame(s) at {}",
            self.first_frame,
            self.last_frame,
            self.total,
            self.free,
            self.used,
            self.info_frames,
            self.info_frame
        )
    }
}

impl PoolRegistry<'_> {
    /// Write a per-pool report to `sink`. Pools are numbered from 1 in
    /// creation order.
    ///
    /// ```text
    /// Pool [1]:
    ///     Frame numbers: 512 to 1023
    ///     512 frames total, 511 frames Free, 1 frames Used.
    ///     1 info frame(s) at frame number(s): 512
    /// ```
    pub fn print_pool_info<S: DiagnosticSink + ?Sized>(&self, sink: &S) {
        sink.write_text("\nPrinting Pool Info...\n");
        for (id, pool) in self.iter() {
            let s = pool.summary();

            sink.write_text("Pool [");
            sink.write_decimal(id.index() as u64 + 1);
            sink.write_text("]:\n\tFrame numbers: ");
            sink.write_decimal(s.first_frame.as_u64());
            sink.write_text(" to ");
            sink.write_decimal(s.last_frame.as_u64());

            sink.write_text("\n\t");
            sink.write_decimal(s.total as u64);
            sink.write_text(" frames total, ");
            sink.write_decimal(s.free as u64);
            sink.write_text(" frames Free, ");
            sink.write_decimal(s.used as u64);
            sink.write_text(" frames Used.\n\t");

            sink.write_decimal(s.info_frames as u64);
            sink.write_text(" info frame(s) at frame number(s): ");
            sink.write_decimal(s.info_frame.as_u64());
            if s.info_frames > 1 {
                sink.write_text("-");
                sink.write_decimal((s.info_frame + (s.info_frames - 1)).as_u64());
            }
            sink.write_text("\n");
        }
        sink.write_text("\n");
    }
}
