//! Hosted bring-up of the kernel frame pools.
//!
//! Plays the part of early kernel init on top of a heap buffer standing in
//! for physical memory from 2 MiB to 32 MiB.

use kernel_console::{ConsoleLogger, DiagnosticSink};
use kernel_frame_pool::mapper::{DirectMapper, FrameMapper};
use kernel_frame_pool::{
    FRAME_SIZE, FramePoolError, InfoFrames, PoolId, PoolRegistry, needed_info_frames,
    release_frames,
};
use kernel_memory_addresses::FrameNumber;
use log::LevelFilter;
use std::io::Write;

const KERNEL_POOL_START_FRAME: u64 = 512; // 2 MiB
const KERNEL_POOL_SIZE: usize = 512; // 2 MiB
const PROCESS_POOL_START_FRAME: u64 = 1024; // 4 MiB
const PROCESS_POOL_SIZE: usize = 7168; // 28 MiB
const MEM_HOLE_START_FRAME: u64 = 3840; // 15 MiB
const MEM_HOLE_SIZE: usize = 256; // 1 MiB

const N_TEST_ALLOCATIONS: u32 = 32;

/// Writes to the process' standard output.
struct StdoutSink;

impl DiagnosticSink for StdoutSink {
    fn write_text(&self, text: &str) {
        let _ = std::io::stdout().lock().write_all(text.as_bytes());
    }
}

fn main() {
    let logger: &'static ConsoleLogger<StdoutSink> =
        Box::leak(Box::new(ConsoleLogger::new(StdoutSink, LevelFilter::Info)));
    if logger.install().is_err() {
        StdoutSink.write_text("logger already installed\n");
    }

    if let Err(e) = run() {
        // A kernel would halt here.
        panic!("frame pool bring-up failed: {e}");
    }
}

fn run() -> Result<(), FramePoolError> {
    // the two pools are adjacent
    let frames = KERNEL_POOL_SIZE + PROCESS_POOL_SIZE;
    let memory = vec![0u8; frames * FRAME_SIZE].leak();
    let offset =
        (memory.as_mut_ptr() as u64).wrapping_sub(KERNEL_POOL_START_FRAME * FRAME_SIZE as u64);
    // SAFETY: Frames 512..8192 are backed by the leaked buffer and used by nothing else.
    let mapper = unsafe { DirectMapper::with_offset(offset) };

    let mut pools = PoolRegistry::new();

    // SAFETY: See above.
    let kernel = unsafe {
        pools.create_pool(
            &mapper,
            FrameNumber::new(KERNEL_POOL_START_FRAME),
            KERNEL_POOL_SIZE,
            InfoFrames::SelfHosted,
        )?
    };

    let n_info_frames = needed_info_frames(PROCESS_POOL_SIZE);
    let process_info = pools.get_frames(kernel, n_info_frames)?;
    // SAFETY: The info frame was just reserved in the kernel pool.
    let process = unsafe {
        pools.create_pool(
            &mapper,
            FrameNumber::new(PROCESS_POOL_START_FRAME),
            PROCESS_POOL_SIZE,
            InfoFrames::External(process_info),
        )?
    };

    pools.mark_inaccessible(
        process,
        FrameNumber::new(MEM_HOLE_START_FRAME),
        MEM_HOLE_SIZE,
    )?;

    StdoutSink.write_text("Testing kernel pool with ");
    StdoutSink.write_decimal(u64::from(N_TEST_ALLOCATIONS));
    StdoutSink.write_text(" nested allocations\n");
    test_memory(&mapper, &mut pools, kernel, N_TEST_ALLOCATIONS)?;

    StdoutSink.write_text("Testing process pool\n");
    test_memory(&mapper, &mut pools, process, N_TEST_ALLOCATIONS)?;

    pools.print_pool_info(&StdoutSink);
    Ok(())
}

/// Allocate `allocs_to_go % 4 + 1` frames, fill them with `allocs_to_go`,
/// recurse, then check the pattern survived and release the frames.
fn test_memory<M: FrameMapper>(
    mapper: &M,
    pools: &mut PoolRegistry<'_>,
    pool: PoolId,
    allocs_to_go: u32,
) -> Result<(), FramePoolError> {
    if allocs_to_go == 0 {
        return Ok(());
    }

    let n_frames = (allocs_to_go % 4 + 1) as usize;
    let frame = pools.get_frames(pool, n_frames)?;
    // SAFETY: The run was just allocated and is backed by the leaked buffer.
    let bytes = unsafe { mapper.frame_bytes_mut(frame, n_frames * FRAME_SIZE) };
    let pattern = allocs_to_go.to_ne_bytes();
    for word in bytes.chunks_exact_mut(pattern.len()) {
        word.copy_from_slice(&pattern);
    }

    test_memory(mapper, pools, pool, allocs_to_go - 1)?;

    if bytes.chunks_exact(pattern.len()).any(|word| word != pattern) {
        StdoutSink.write_text("MEMORY TEST FAILED. ERROR IN FRAME POOL\n");
        panic!("run at frame {frame} was overwritten");
    }

    release_frames(pools, frame)?;
    Ok(())
}
