//! Lock-free waveform tap for the oscilloscope display
//!
//! The audio callback pushes a downsampled, gamma-shaped copy of the output
//! waveform into a wait-free SPSC ring; the display task drains it at its
//! own pace. The producer never blocks and simply drops samples when the
//! display falls behind.
//!
//! Performance characteristics:
//! - Lock-free (no mutex contention with the audio callback)
//! - Wait-free for single producer/consumer
//! - Cache-padded counters to prevent false sharing between cores
//! - No allocations after construction

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

struct ScopeShared {
    /// Sample storage as raw f32 bits (capacity is a power of 2)
    slots: Box<[AtomicU32]>,

    /// Write position (cache-padded to prevent false sharing)
    write_pos: CachePadded<AtomicUsize>,

    /// Read position (cache-padded to prevent false sharing)
    read_pos: CachePadded<AtomicUsize>,

    /// Mask for fast modulo operation (capacity - 1)
    mask: usize,
}

impl ScopeShared {
    fn available_read(&self, read_pos: usize, write_pos: usize) -> usize {
        write_pos.wrapping_sub(read_pos)
    }

    fn available_write(&self, write_pos: usize, read_pos: usize) -> usize {
        // One slot is kept empty to distinguish full from empty
        self.slots.len() - write_pos.wrapping_sub(read_pos) - 1
    }
}

/// Create a connected tap/reader pair.
///
/// `capacity` is rounded up to the next power of 2. `downsample` keeps one
/// frame in N; `gamma` shapes the amplitude (values below 1.0 lift quiet
/// material so the trace stays visible).
pub fn scope_channel(
    mut capacity: usize,
    downsample: usize,
    gamma: f32,
) -> (ScopeTap, ScopeReader) {
    if !capacity.is_power_of_two() {
        capacity = capacity.next_power_of_two();
    }

    let shared = Arc::new(ScopeShared {
        slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        write_pos: CachePadded::new(AtomicUsize::new(0)),
        read_pos: CachePadded::new(AtomicUsize::new(0)),
        mask: capacity - 1,
    });

    (
        ScopeTap {
            shared: Arc::clone(&shared),
            downsample: downsample.max(1),
            frame_counter: 0,
            gamma,
        },
        ScopeReader { shared },
    )
}

/// Producer half, owned by the audio callback.
pub struct ScopeTap {
    shared: Arc<ScopeShared>,
    downsample: usize,
    frame_counter: usize,
    gamma: f32,
}

impl ScopeTap {
    /// Capture from an interleaved buffer of `[-1, 1]` device samples.
    ///
    /// Only the first channel of every N-th frame is kept. Real-time safe:
    /// no locks, no allocation, excess samples are dropped.
    pub fn capture(&mut self, interleaved: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }

        let write_pos = self.shared.write_pos.load(Ordering::Relaxed);
        let read_pos = self.shared.read_pos.load(Ordering::Acquire);
        let mut available = self.shared.available_write(write_pos, read_pos);
        let mut write_pos_now = write_pos;

        for frame in interleaved.chunks_exact(channels) {
            let keep = self.frame_counter % self.downsample == 0;
            self.frame_counter = self.frame_counter.wrapping_add(1);
            if !keep {
                continue;
            }
            if available == 0 {
                break;
            }

            let norm = frame[0].clamp(-1.0, 1.0);
            let shaped = norm.abs().powf(self.gamma).copysign(norm);

            self.shared.slots[write_pos_now & self.shared.mask]
                .store(shaped.to_bits(), Ordering::Relaxed);
            write_pos_now = write_pos_now.wrapping_add(1);
            available -= 1;
        }

        // Release makes the stored samples visible to the reader
        self.shared.write_pos.store(write_pos_now, Ordering::Release);
    }
}

/// Consumer half, owned by the display task.
pub struct ScopeReader {
    shared: Arc<ScopeShared>,
}

impl ScopeReader {
    /// Read captured samples into `out`, returning how many were read.
    pub fn drain(&mut self, out: &mut [f32]) -> usize {
        let read_pos = self.shared.read_pos.load(Ordering::Relaxed);
        let write_pos = self.shared.write_pos.load(Ordering::Acquire);

        let available = self.shared.available_read(read_pos, write_pos);
        let to_read = out.len().min(available);

        for (i, slot) in out.iter_mut().enumerate().take(to_read) {
            let bits = self.shared.slots[(read_pos.wrapping_add(i)) & self.shared.mask]
                .load(Ordering::Relaxed);
            *slot = f32::from_bits(bits);
        }

        self.shared
            .read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);

        to_read
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        let read_pos = self.shared.read_pos.load(Ordering::Relaxed);
        let write_pos = self.shared.write_pos.load(Ordering::Acquire);
        self.shared.available_read(read_pos, write_pos)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
