//! Bounded circular byte store with monotonic global offset accounting (§4.2).

pub const DEFAULT_RING_CAPACITY: usize = 10 * 1024 * 1024;

/// Result of a delta-replay lookup (§4.2, `read_from`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFrom {
    /// The requested offset is within the retained window; here is the tail.
    Delta(Vec<u8>),
    /// The offset equals `totalWritten`; the caller is already caught up.
    UpToDate,
    /// The offset is older than the retained window; caller must full-replay.
    TooOld,
}

/// Fixed-capacity ring buffer. Not thread-safe on its own — callers that share it across
/// tasks wrap it in a mutex (the only shared-mutation point per §5.7).
pub struct RingBuffer {
    data: Vec<u8>,
    capacity: usize,
    /// Next index to be written, modulo `capacity`.
    cursor: usize,
    wrapped: bool,
    total_written: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            data: vec![0u8; capacity],
            capacity,
            cursor: 0,
            wrapped: false,
            total_written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of bytes currently retained (`min(totalWritten, capacity)`).
    pub fn len(&self) -> usize {
        if self.wrapped {
            self.capacity
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append bytes, advancing `totalWritten`. If `bytes` is at least as large as the
    /// capacity, only the tail slice of length `capacity` is retained (§4.2).
    pub fn write(&mut self, bytes: &[u8]) {
        self.total_written += bytes.len() as u64;

        let bytes = if bytes.len() >= self.capacity {
            self.wrapped = true;
            self.cursor = 0;
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };

        if bytes.is_empty() {
            return;
        }

        let first_len = (self.capacity - self.cursor).min(bytes.len());
        self.data[self.cursor..self.cursor + first_len].copy_from_slice(&bytes[..first_len]);

        let remaining = &bytes[first_len..];
        if !remaining.is_empty() {
            self.data[..remaining.len()].copy_from_slice(remaining);
            self.wrapped = true;
        }

        self.cursor = (self.cursor + bytes.len()) % self.capacity;
        if self.cursor == 0 && !bytes.is_empty() {
            self.wrapped = true;
        }
    }

    /// Linearize the retained contents in write order: oldest byte first.
    fn linearize(&self) -> Vec<u8> {
        if !self.wrapped {
            return self.data[..self.cursor].to_vec();
        }
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&self.data[self.cursor..]);
        out.extend_from_slice(&self.data[..self.cursor]);
        out
    }

    /// Return the retained contents, sanitized for full replay: wrap boundaries can land
    /// mid-escape-sequence or mid-UTF-8 codepoint, so skip up to and including the first
    /// newline when the buffer has wrapped. If no newline is present, return as-is.
    pub fn read_full(&self) -> Vec<u8> {
        let linear = self.linearize();
        if !self.wrapped {
            return linear;
        }
        match linear.iter().position(|&b| b == b'\n') {
            Some(idx) => linear[idx + 1..].to_vec(),
            None => linear,
        }
    }

    /// Delta-resume lookup (§4.2). Unsanitized — callers have already consumed a clean
    /// prefix from a prior full replay.
    pub fn read_from(&self, offset: u64) -> ReadFrom {
        if offset >= self.total_written {
            return ReadFrom::UpToDate;
        }
        let retained = self.len() as u64;
        let oldest_retained = self.total_written.saturating_sub(retained);
        if offset < oldest_retained {
            return ReadFrom::TooOld;
        }
        let linear = self.linearize();
        let skip = (offset - oldest_retained) as usize;
        ReadFrom::Delta(linear[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn total_written_tracks_all_writes() {
        let mut ring = RingBuffer::new(16);
        ring.write(b"abcde");
        ring.write(b"fghij");
        assert_eq!(ring.total_written(), 10);
    }

    #[test]
    fn small_writes_are_recoverable_from_start() {
        let mut ring = RingBuffer::new(16);
        ring.write(b"hello");
        assert_eq!(ring.read_full(), b"hello");
    }

    #[test]
    fn oversized_single_write_retains_tail_only() {
        let mut ring = RingBuffer::new(4);
        ring.write(b"abcdefgh");
        assert_eq!(ring.total_written(), 8);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.linearize(), b"efgh");
    }

    #[test]
    fn read_from_up_to_date_when_offset_equals_total() {
        let mut ring = RingBuffer::new(16);
        ring.write(b"hello");
        assert_eq!(ring.read_from(5), ReadFrom::UpToDate);
    }

    #[test]
    fn read_from_too_old_below_retained_window() {
        let mut ring = RingBuffer::new(4);
        ring.write(b"abcdefgh"); // retains "efgh", oldest retained offset = 4
        assert_eq!(ring.read_from(0), ReadFrom::TooOld);
        assert_eq!(ring.read_from(3), ReadFrom::TooOld);
    }

    #[test]
    fn read_from_delta_returns_exact_unseen_suffix() {
        let mut ring = RingBuffer::new(16);
        ring.write(b"abcde");
        ring.write(b"fghij");
        assert_eq!(ring.read_from(5), ReadFrom::Delta(b"fghij".to_vec()));
        assert_eq!(ring.read_from(7), ReadFrom::Delta(b"hij".to_vec()));
    }

    #[test]
    fn wrap_sets_flag_and_linearizes_in_order() {
        let mut ring = RingBuffer::new(4);
        ring.write(b"ab");
        ring.write(b"cd"); // cursor wraps to 0 exactly here
        ring.write(b"ef"); // now overwrites ab
        assert_eq!(ring.linearize(), b"cdef");
    }

    #[test]
    fn read_full_skips_to_first_newline_only_when_wrapped() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"12\n3456"); // not wrapped yet (7 < 8)
        assert_eq!(ring.read_full(), b"12\n3456");

        ring.write(b"78"); // now wraps
        // linearized: oldest-first after wrap; should skip up to/including first '\n'
        let full = ring.read_full();
        assert!(!full.contains(&b'\n') || full.iter().position(|&b| b == b'\n').is_none());
    }

    #[test]
    fn read_full_returns_as_is_when_wrapped_with_no_newline() {
        let mut ring = RingBuffer::new(4);
        ring.write(b"abcdefgh"); // wrapped, no newline anywhere
        assert_eq!(ring.read_full(), b"efgh");
    }

    proptest! {
        #[test]
        fn invariant_total_written_matches_sum_of_write_lengths(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..30), 0..20)
        ) {
            let mut ring = RingBuffer::new(64);
            let mut expected_total: u64 = 0;
            for chunk in &chunks {
                ring.write(chunk);
                expected_total += chunk.len() as u64;
            }
            prop_assert_eq!(ring.total_written(), expected_total);
        }

        #[test]
        fn invariant_read_from_exact_suffix_within_capacity(
            prefix in prop::collection::vec(any::<u8>(), 0..64),
            suffix in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let cap = 64;
            let mut ring = RingBuffer::new(cap);
            ring.write(&prefix);
            let offset_after_prefix = ring.total_written();
            ring.write(&suffix);

            if suffix.len() as u64 <= cap as u64 {
                match ring.read_from(offset_after_prefix) {
                    ReadFrom::Delta(data) => prop_assert_eq!(data, suffix),
                    ReadFrom::UpToDate => prop_assert!(suffix.is_empty()),
                    ReadFrom::TooOld => prop_assert!(false, "should not be too old: {:?}", suffix),
                }
            }
        }

        #[test]
        fn invariant_offset_equal_to_total_is_up_to_date(
            chunk in prop::collection::vec(any::<u8>(), 0..64)
        ) {
            let mut ring = RingBuffer::new(32);
            ring.write(&chunk);
            prop_assert_eq!(ring.read_from(ring.total_written()), ReadFrom::UpToDate);
        }

        #[test]
        fn invariant_offset_below_window_is_too_old(
            first in prop::collection::vec(any::<u8>(), 40..80),
            second in prop::collection::vec(any::<u8>(), 1..10),
        ) {
            let cap = 32;
            let mut ring = RingBuffer::new(cap);
            ring.write(&first);
            ring.write(&second);
            let retained_floor = ring.total_written() - cap as u64;
            if retained_floor > 0 {
                prop_assert_eq!(ring.read_from(retained_floor - 1), ReadFrom::TooOld);
            }
        }
    }
}
