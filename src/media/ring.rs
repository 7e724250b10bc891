/// Ring Buffer
/// Fixed-capacity circular store of interleaved sample records
///
/// Decouples the network/decoding thread (producer) from the audio callback
/// (consumer). A record is one frame of `channels` samples. One record slot is
/// kept free so a full buffer and an empty one never share the same pair of
/// indices, which keeps `len()` a pure function of the two indices.
///
/// Oversized `put`s and `get`s are rejected outright; the buffer never grows,
/// blocks, or silently drops data.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::error::RingBufferError;

#[derive(Debug)]
struct RingState<T> {
    /// `(capacity + 1) * channels` elements
    store: Vec<T>,
    /// Record index of the next write
    producer: usize,
    /// Record index of the next read
    consumer: usize,
    overruns: u64,
    underruns: u64,
}

/// Thread-safe ring buffer of `channels`-wide records of `T`.
///
/// The element type is fixed by `T`, so a block of the wrong sample type does
/// not compile; the record width is checked on every call.
#[derive(Debug)]
pub struct RingBuffer<T> {
    capacity: usize,
    channels: usize,
    state: Mutex<RingState<T>>,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a buffer holding up to `capacity` records of `channels` samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero.
    pub fn new(capacity: usize, channels: usize) -> Self {
        assert!(channels > 0, "Ring buffer records need at least one channel");

        Self {
            capacity,
            channels,
            state: Mutex::new(RingState {
                store: vec![T::default(); (capacity + 1) * channels],
                producer: 0,
                consumer: 0,
                overruns: 0,
                underruns: 0,
            }),
        }
    }

    /// Copy whole records into the buffer.
    ///
    /// Fails with `BufferOverrun` if there is not enough free space for all of
    /// them; nothing is written in that case.
    pub fn put(&self, records: &[T]) -> Result<(), RingBufferError> {
        let count = self.record_count(records.len())?;
        let slots = self.slots();
        let ch = self.channels;

        let mut state = self.lock();
        let free = self.capacity - Self::used(&state, slots);
        if count > free {
            state.overruns += 1;
            trace!("Ring buffer overrun: {} records into {} free", count, free);
            return Err(RingBufferError::BufferOverrun {
                requested: count,
                free,
            });
        }

        let start = state.producer;
        let tail = count.min(slots - start);
        let (tail_src, head_src) = records.split_at(tail * ch);
        state.store[start * ch..(start + tail) * ch].copy_from_slice(tail_src);
        state.store[..head_src.len()].copy_from_slice(head_src);
        state.producer = (start + count) % slots;

        Ok(())
    }

    /// Fill `out` with the oldest records.
    ///
    /// Fails with `BufferUnderrun` if fewer records are buffered than `out`
    /// asks for; nothing is consumed in that case.
    pub fn get(&self, out: &mut [T]) -> Result<(), RingBufferError> {
        let count = self.record_count(out.len())?;
        let slots = self.slots();
        let ch = self.channels;

        let mut state = self.lock();
        let available = Self::used(&state, slots);
        if count > available {
            state.underruns += 1;
            trace!("Ring buffer underrun: {} records from {} available", count, available);
            return Err(RingBufferError::BufferUnderrun {
                requested: count,
                available,
            });
        }

        let start = state.consumer;
        let tail = count.min(slots - start);
        let (tail_dst, head_dst) = out.split_at_mut(tail * ch);
        let head_len = head_dst.len();
        tail_dst.copy_from_slice(&state.store[start * ch..(start + tail) * ch]);
        head_dst.copy_from_slice(&state.store[..head_len]);
        state.consumer = (start + count) % slots;

        Ok(())
    }
}

impl<T> RingBuffer<T> {
    fn lock(&self) -> MutexGuard<'_, RingState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Physical record slots, including the sentinel
    fn slots(&self) -> usize {
        self.capacity + 1
    }

    fn used(state: &RingState<T>, slots: usize) -> usize {
        (state.producer + slots - state.consumer) % slots
    }

    fn record_count(&self, elements: usize) -> Result<usize, RingBufferError> {
        if elements % self.channels != 0 {
            return Err(RingBufferError::ShapeMismatch {
                len: elements,
                channels: self.channels,
            });
        }
        Ok(elements / self.channels)
    }

    /// Buffered records
    pub fn len(&self) -> usize {
        Self::used(&self.lock(), self.slots())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Records that can be written before the buffer is full
    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }

    /// Usable capacity in records
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per record
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Rejected `put`s so far
    pub fn overrun_count(&self) -> u64 {
        self.lock().overruns
    }

    /// Rejected `get`s so far
    pub fn underrun_count(&self) -> u64 {
        self.lock().underruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_retrieve_mono() {
        let ring = RingBuffer::<u8>::new(1000, 1);
        let data = [1u8; 10];

        ring.put(&data).unwrap();
        assert_eq!(ring.len(), 10);

        let mut out = [0u8; 10];
        ring.get(&mut out).unwrap();
        assert_eq!(out, data);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_store_and_retrieve_stereo() {
        let ring = RingBuffer::<i16>::new(1000, 2);
        let data: Vec<i16> = (0..10).collect();

        ring.put(&data).unwrap();
        assert_eq!(ring.len(), 5);

        let mut out = vec![0i16; 10];
        ring.get(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_wrap_around() {
        let ring = RingBuffer::<u8>::new(10, 1);

        ring.put(&[1; 8]).unwrap();
        let mut out = [0u8; 8];
        ring.get(&mut out).unwrap();
        assert_eq!(out, [1; 8]);

        // Write straddles the physical end of the store
        ring.put(&[2, 3, 4, 5, 6]).unwrap();
        let mut out = [0u8; 5];
        ring.get(&mut out).unwrap();
        assert_eq!(out, [2, 3, 4, 5, 6]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wrap_around_multichannel() {
        let ring = RingBuffer::<f32>::new(4, 2);

        ring.put(&[0.0; 6]).unwrap();
        let mut out = [9.0f32; 6];
        ring.get(&mut out).unwrap();

        let data = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0];
        ring.put(&data).unwrap();
        assert!(ring.is_full());

        let mut out = [0.0f32; 8];
        ring.get(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_put_larger_than_capacity() {
        let ring = RingBuffer::<u8>::new(10, 1);

        let err = ring.put(&[1; 11]).unwrap_err();
        assert_eq!(err, RingBufferError::BufferOverrun { requested: 11, free: 10 });
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.overrun_count(), 1);
    }

    #[test]
    fn test_buffer_overflow() {
        let ring = RingBuffer::<u8>::new(10, 1);

        ring.put(&[1; 9]).unwrap();
        let err = ring.put(&[1; 2]).unwrap_err();
        assert_eq!(err, RingBufferError::BufferOverrun { requested: 2, free: 1 });
        assert_eq!(ring.len(), 9);

        // Exactly filling the remaining slot is fine
        ring.put(&[1]).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.free(), 0);
    }

    #[test]
    fn test_buffer_overflow_in_wrap_around() {
        let ring = RingBuffer::<u8>::new(10, 1);

        // Move the consumer index towards the end of the store
        ring.put(&[1; 9]).unwrap();
        let mut out = [0u8; 9];
        ring.get(&mut out).unwrap();

        // Producer wraps round to the left of the consumer
        ring.put(&[1; 6]).unwrap();
        assert_eq!(ring.len(), 6);

        assert!(matches!(
            ring.put(&[1; 5]),
            Err(RingBufferError::BufferOverrun { requested: 5, free: 4 })
        ));
        assert_eq!(ring.len(), 6);
    }

    #[test]
    fn test_buffer_underrun() {
        let ring = RingBuffer::<i32>::new(3, 1);

        let mut out = [0i32; 1];
        assert_eq!(
            ring.get(&mut out),
            Err(RingBufferError::BufferUnderrun { requested: 1, available: 0 })
        );

        ring.put(&[5, 6]).unwrap();
        let mut out = [0i32; 3];
        assert!(ring.get(&mut out).is_err());
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.underrun_count(), 2);
    }

    #[test]
    fn test_put_incorrect_shape() {
        let ring = RingBuffer::<i32>::new(10, 2);

        assert_eq!(
            ring.put(&[0; 3]),
            Err(RingBufferError::ShapeMismatch { len: 3, channels: 2 })
        );
        let mut out = [0i32; 1];
        assert!(matches!(
            ring.get(&mut out),
            Err(RingBufferError::ShapeMismatch { .. })
        ));
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn test_empty_put_and_get() {
        let ring = RingBuffer::<i16>::new(0, 1);

        ring.put(&[]).unwrap();
        ring.get(&mut []).unwrap();
        assert!(ring.is_empty());
        assert!(ring.is_full());
        assert!(ring.put(&[1]).is_err());
    }

    #[test]
    #[should_panic(expected = "at least one channel")]
    fn test_zero_channels_rejected() {
        let _ = RingBuffer::<i16>::new(8, 0);
    }

    #[test]
    fn test_producer_consumer_threads() {
        use std::sync::Arc;
        use std::thread;

        const BLOCK: usize = 7;
        const BLOCKS: usize = 500;

        let ring = Arc::new(RingBuffer::<u32>::new(32, 1));

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut next = 0u32;
                let mut sent = 0;
                while sent < BLOCKS {
                    let block: Vec<u32> = (next..next + BLOCK as u32).collect();
                    if ring.put(&block).is_ok() {
                        next += BLOCK as u32;
                        sent += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(BLOCK * BLOCKS);
        let mut block = [0u32; 5];
        while received.len() < BLOCK * BLOCKS {
            let want = (BLOCK * BLOCKS - received.len()).min(block.len());
            if ring.get(&mut block[..want]).is_ok() {
                received.extend_from_slice(&block[..want]);
            } else {
                thread::yield_now();
            }
        }

        producer.join().unwrap();
        assert_eq!(received, (0..(BLOCK * BLOCKS) as u32).collect::<Vec<_>>());
    }
}
