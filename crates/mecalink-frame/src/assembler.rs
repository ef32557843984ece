use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::codec::{decode_frame, Decoded, Frame, MIN_FRAME_SIZE};
use crate::kind::kind_name;

/// Default reassembly buffer bound in bytes.
pub const DEFAULT_CAPACITY: usize = 512;

/// Configuration for the stream reassembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Maximum number of buffered bytes. Exceeding it discards the buffer.
    ///
    /// Values below `MAX_FRAME_SIZE` are accepted for memory-constrained
    /// endpoints; frames larger than the bound are then never delivered.
    pub capacity: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Counters describing what the reassembler has seen on this connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Frames delivered.
    pub frames: u64,
    /// Bytes discarded one at a time while searching for a frame start.
    pub resync_bytes: u64,
    /// Times the buffer was discarded for exceeding its capacity.
    pub overflow_resets: u64,
}

/// Extracts complete frames from an append-only, arbitrarily fragmented
/// byte stream.
///
/// Malformed input never produces an error: a byte that cannot start a valid
/// frame is dropped and the search resumes at the next byte. A frame that is
/// only partially buffered stays put until more bytes arrive.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    capacity: usize,
    stats: AssemblerStats,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Create a reassembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(AssemblerConfig::default())
    }

    /// Create a reassembler with explicit configuration.
    pub fn with_config(config: AssemblerConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            stats: AssemblerStats::default(),
        }
    }

    /// Append `data` and return every frame it completes, in stream order.
    ///
    /// Input is appended in pieces no larger than the free space so that a
    /// large burst of well-formed frames is never mistaken for overflow.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let room = self.capacity.saturating_sub(self.buf.len()).max(1);
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            self.extend(chunk);
            frames.extend(self.frames());
            rest = tail;
        }

        frames
    }

    /// Append raw bytes without extracting frames.
    ///
    /// If the buffer then holds more than its capacity it is discarded
    /// entirely; any frame straddling the reset is lost.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > self.capacity {
            warn!(
                dropped = self.buf.len(),
                capacity = self.capacity,
                "reassembly buffer overflow, discarding"
            );
            self.buf.clear();
            self.stats.overflow_resets += 1;
        }
    }

    /// Extract the next complete frame from already-buffered bytes.
    ///
    /// Returns `None` once the buffer holds no complete frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        while self.buf.len() >= MIN_FRAME_SIZE {
            match decode_frame(&self.buf) {
                Decoded::Frame(frame) => {
                    self.buf.advance(frame.wire_size());
                    self.stats.frames += 1;
                    trace!(
                        kind = kind_name(frame.kind),
                        len = frame.payload.len(),
                        "frame decoded"
                    );
                    return Some(frame);
                }
                Decoded::Incomplete => return None,
                Decoded::Invalid => {
                    // Either not a start sentinel, or a false one whose end
                    // sentinel does not match. Both shift the window by one.
                    trace!(byte = self.buf[0], "resync: dropping byte");
                    self.buf.advance(1);
                    self.stats.resync_bytes += 1;
                }
            }
        }
        None
    }

    /// Lazily drain the complete frames currently buffered.
    pub fn frames(&mut self) -> impl Iterator<Item = Frame> + '_ {
        std::iter::from_fn(move || self.next_frame())
    }

    /// Discard buffered bytes and counters (new session).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.stats = AssemblerStats::default();
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Configured buffer bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counters since the last reset.
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use proptest::prelude::*;

    use super::*;
    use crate::codec::{encode_frame, MARKER_END, MARKER_START, MAX_FRAME_SIZE};
    use crate::kind::{CONTROL, HEARTBEAT, MOVE, TARGET};

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            frame.encode(&mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::empty(HEARTBEAT),
            Frame::new(MOVE, vec![100, 0, 0, 0, 0, 0]),
            Frame::new(CONTROL, vec![1, 0, 1, 0]),
            Frame::new(TARGET, vec![0xAA, 0x55, 0x55, 0xAA]),
            Frame::empty(HEARTBEAT),
        ]
    }

    #[test]
    fn single_frame_in_one_chunk() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&wire(&[Frame::new(MOVE, vec![1, 2, 3, 4, 5, 6])]));

        assert_eq!(frames, vec![Frame::new(MOVE, vec![1, 2, 3, 4, 5, 6])]);
        assert!(assembler.is_empty());
    }

    #[test]
    fn byte_at_a_time_matches_all_at_once() {
        let expected = sample_frames();
        let bytes = wire(&expected);

        let mut whole = FrameAssembler::new();
        let at_once = whole.push(&bytes);

        let mut split = FrameAssembler::new();
        let mut one_by_one = Vec::new();
        for byte in &bytes {
            one_by_one.extend(split.push(std::slice::from_ref(byte)));
        }

        assert_eq!(at_once, expected);
        assert_eq!(one_by_one, expected);
    }

    #[test]
    fn waits_for_rest_of_frame() {
        let bytes = wire(&[Frame::new(TARGET, vec![1, 0, 2, 0])]);
        let mut assembler = FrameAssembler::new();

        assert!(assembler.push(&bytes[..5]).is_empty());
        assert_eq!(assembler.len(), 5);

        let frames = assembler.push(&bytes[5..]);
        assert_eq!(frames, vec![Frame::new(TARGET, vec![1, 0, 2, 0])]);
    }

    #[test]
    fn leading_noise_is_skipped_one_byte_at_a_time() {
        let mut bytes = vec![0x00, 0x13, 0x37];
        bytes.extend(wire(&[Frame::empty(HEARTBEAT)]));

        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&bytes);

        assert_eq!(frames, vec![Frame::empty(HEARTBEAT)]);
        assert_eq!(assembler.stats().resync_bytes, 3);
    }

    #[test]
    fn false_start_sentinel_is_dropped() {
        // 0xAA followed by a length whose end byte is wrong, then a real frame.
        let mut bytes = vec![MARKER_START, MOVE, 0x02, 0x01, 0x02, 0x00];
        bytes.extend(wire(&[Frame::new(CONTROL, vec![0, 1, 0, 0])]));

        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&bytes);

        assert_eq!(frames, vec![Frame::new(CONTROL, vec![0, 1, 0, 0])]);
    }

    #[test]
    fn corrupted_end_sentinel_loses_only_that_frame() {
        let expected = sample_frames();
        let mut bytes = wire(&expected);
        // End sentinel of the MOVE frame (offset 4 + 10 - 1).
        let end_of_move = 4 + 10 - 1;
        assert_eq!(bytes[end_of_move], MARKER_END);
        bytes[end_of_move] = 0x00;

        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(&bytes);

        let mut survivors = expected.clone();
        survivors.remove(1);
        assert_eq!(frames, survivors);
    }

    #[test]
    fn overflow_resets_buffer() {
        let mut assembler = FrameAssembler::with_config(AssemblerConfig { capacity: 8 });
        // Claims a 200-byte payload that can never fit.
        let mut bytes = vec![MARKER_START, MOVE, 200];
        bytes.extend(std::iter::repeat(0x11).take(20));

        assert!(assembler.push(&bytes).is_empty());
        assert!(assembler.stats().overflow_resets >= 1);
        assert!(assembler.len() <= assembler.capacity());

        // Recovers for subsequent traffic.
        let frames = assembler.push(&wire(&[Frame::empty(HEARTBEAT)]));
        assert_eq!(frames, vec![Frame::empty(HEARTBEAT)]);
    }

    #[test]
    fn large_burst_of_valid_frames_is_not_overflow() {
        let frames: Vec<Frame> = (0..64u8).map(|i| Frame::new(MOVE, vec![i; 6])).collect();
        let bytes = wire(&frames);
        assert!(bytes.len() > DEFAULT_CAPACITY);

        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.push(&bytes), frames);
        assert_eq!(assembler.stats().overflow_resets, 0);
    }

    #[test]
    fn max_frame_fits_default_capacity() {
        let frame = Frame::new(0x10, vec![0xAB; MAX_FRAME_SIZE - 4]);
        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.push(&wire(&[frame.clone()])), vec![frame]);
    }

    #[test]
    fn frames_iterator_is_lazy() {
        let mut assembler = FrameAssembler::new();
        assembler.extend(&wire(&sample_frames()));

        let first = assembler.frames().next();
        assert_eq!(first, Some(Frame::empty(HEARTBEAT)));
        assert_eq!(assembler.stats().frames, 1);
        assert_eq!(assembler.frames().count(), 4);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let bytes = wire(&[Frame::new(MOVE, vec![1, 2, 3, 4, 5, 6])]);
        let mut assembler = FrameAssembler::new();
        assembler.push(&bytes[..4]);
        assembler.reset();

        // The tail of the old frame is noise for the new session.
        let mut next = bytes[4..].to_vec();
        next.extend(wire(&[Frame::empty(HEARTBEAT)]));
        assert_eq!(assembler.push(&next), vec![Frame::empty(HEARTBEAT)]);
    }

    #[test]
    fn encode_helper_agrees_with_frame_encode() {
        let mut a = BytesMut::new();
        let mut b = BytesMut::new();
        encode_frame(TARGET, &[1, 2, 3, 4], &mut a).unwrap();
        Frame::new(TARGET, vec![1, 2, 3, 4]).encode(&mut b).unwrap();
        assert_eq!(a, b);
    }

    fn arb_frame() -> impl Strategy<Value = Frame> {
        (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..=32))
            .prop_map(|(kind, payload)| Frame::new(kind, payload))
    }

    proptest! {
        #[test]
        fn prop_fragmentation_independent(
            frames in proptest::collection::vec(arb_frame(), 1..16),
            cuts in proptest::collection::vec(1usize..24, 0..64),
        ) {
            let bytes = wire(&frames);
            let mut assembler = FrameAssembler::new();
            let mut got = Vec::new();
            let mut offset = 0;
            for cut in cuts {
                if offset >= bytes.len() {
                    break;
                }
                let end = (offset + cut).min(bytes.len());
                got.extend(assembler.push(&bytes[offset..end]));
                offset = end;
            }
            got.extend(assembler.push(&bytes[offset..]));
            prop_assert_eq!(got, frames);
        }

        #[test]
        fn prop_recovers_after_single_corrupt_byte(
            frames in proptest::collection::vec(arb_frame(), 2..12),
            pick in any::<prop::sample::Index>(),
            noise in any::<u8>(),
        ) {
            let mut corrupted = wire(&frames);
            let at = pick.index(corrupted.len());
            corrupted[at] = noise;

            // A false start spans at most MAX_FRAME_SIZE bytes, so this much
            // zero filler can never close one.
            corrupted.extend(std::iter::repeat(0x00).take(MAX_FRAME_SIZE));
            let trailer = vec![Frame::empty(HEARTBEAT), Frame::new(MOVE, vec![9; 6])];
            corrupted.extend(wire(&trailer));

            let mut assembler = FrameAssembler::new();
            let got = assembler.push(&corrupted);
            prop_assert!(got.ends_with(&trailer));
        }
    }
}
