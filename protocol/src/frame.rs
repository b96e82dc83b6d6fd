//! L2: frame layer. Splits/reassembles the 4-byte-header framing described in
//! framing, and owns the four-region read buffer.
//!
//! Grounded on `connection::conn::packet_channel::PacketChannel::read_packet`/
//! `write_packet`, generalized from "one frame per message" (adequate for a
//! CDC reader whose messages never approach 16 MiB) to full multi-frame
//! reassembly, since a client library must handle arbitrarily large rows.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::err::decode_error::ReError;
use common::err::CResult;

pub const HEADER_SIZE: usize = 4;
pub const MAX_FRAME_PAYLOAD: usize = 0xFF_FFFF; // 2^24 - 1

/// A growable byte buffer split into four contiguous, non-overlapping
/// regions:
///
/// `[ reserved | current message | pending | free ]`
///
/// `reserved` holds bytes belonging to messages already handed out as views
/// (kept so those views stay valid); `current message` holds the bytes of the
/// message presently being assembled; `pending` holds bytes read from the
/// wire but not yet claimed by a message; `free` is spare capacity.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    storage: Vec<u8>,
    reserved_end: usize,
    message_end: usize,
    pending_end: usize,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes belonging to the message currently being parsed.
    pub fn current_message(&self) -> &[u8] {
        &self.storage[self.reserved_end..self.message_end]
    }

    /// Bytes read from the wire but not yet assigned to a message.
    pub fn pending(&self) -> &[u8] {
        &self.storage[self.message_end..self.pending_end]
    }

    /// The spare capacity available for the next `read_some`.
    pub fn free_mut(&mut self, min_extra: usize) -> &mut [u8] {
        let needed = self.pending_end + min_extra;
        if needed > self.storage.len() {
            self.storage.resize(needed.max(self.storage.len() * 2), 0);
        }
        &mut self.storage[self.pending_end..]
    }

    /// Records that `n` bytes were read into the tail returned by `free_mut`.
    pub fn commit_read(&mut self, n: usize) {
        self.pending_end += n;
    }

    /// Moves `n` bytes from `pending` into `current message`.
    fn claim(&mut self, n: usize) {
        debug_assert!(self.message_end + n <= self.pending_end);
        self.message_end += n;
    }

    /// Drops the current message: everything before `message_end` becomes
    /// `reserved` (kept alive for outstanding views) up to the point the
    /// caller calls [`release_reserved`].
    pub fn finish_message(&mut self) {
        self.reserved_end = self.message_end;
    }

    /// Releases the `reserved` region once no user-held view references it
    /// (at a batch boundary, once the caller is done with prior views).
    pub fn release_reserved(&mut self) {
        if self.reserved_end == 0 {
            return;
        }
        self.storage.copy_within(self.reserved_end..self.pending_end, 0);
        self.message_end -= self.reserved_end;
        self.pending_end -= self.reserved_end;
        self.reserved_end = 0;
    }
}

/// Sequence-number tracker for one direction of one exchange; wraps modulo
/// 256.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceNumber(pub u8);

impl SequenceNumber {
    pub fn next(self) -> Self {
        SequenceNumber(self.0.wrapping_add(1))
    }
}

/// Parses one wire frame header out of `pending`, returning `(payload_len,
/// seq_num)` if a full header is available.
fn parse_header(bytes: &[u8]) -> CResult<Option<(usize, u8)>> {
    if bytes.len() < HEADER_SIZE {
        return Ok(None);
    }
    let mut cursor = std::io::Cursor::new(&bytes[..3]);
    let len = cursor
        .read_u24::<LittleEndian>()
        .map_err(|_| ReError::Framing("truncated frame header".to_string()))? as usize;
    if len > MAX_FRAME_PAYLOAD {
        return Err(ReError::Framing(format!(
            "frame payload length {len} exceeds the protocol maximum of {MAX_FRAME_PAYLOAD}"
        )));
    }
    Ok(Some((len, bytes[3])))
}

/// Attempts to reassemble one complete message out of `buf.pending()`.
///
/// On success, advances the buffer so `current_message()` holds the
/// reassembled payload and returns the sequence number expected to start the
/// *next* message in the same direction. Returns `Ok(None)` if more bytes
/// must be read first.
pub fn try_reassemble(buf: &mut ReadBuffer, expected_seq: SequenceNumber) -> CResult<Option<u8>> {
    let mut seq = expected_seq.0;
    let mut consumed_header_and_body = 0usize;
    let mut saw_full_size_frame = false;

    loop {
        let remaining = &buf.pending()[consumed_header_and_body..];
        let (frame_len, frame_seq) = match parse_header(remaining)? {
            Some(h) => h,
            None => return Ok(None),
        };
        if frame_seq != seq {
            return Err(ReError::Framing(format!(
                "sequence number mismatch: expected {seq}, got {frame_seq}"
            )));
        }
        if remaining.len() < HEADER_SIZE + frame_len {
            return Ok(None);
        }

        consumed_header_and_body += HEADER_SIZE + frame_len;
        seq = seq.wrapping_add(1);
        saw_full_size_frame = frame_len == MAX_FRAME_PAYLOAD;

        if frame_len < MAX_FRAME_PAYLOAD {
            break;
        }
    }
    let _ = saw_full_size_frame;

    // Compact the frame headers out, leaving only payload bytes contiguous in
    // `current message`. We do this in place, walking forward.
    compact_frames(buf, consumed_header_and_body)?;
    Ok(Some(seq))
}

fn compact_frames(buf: &mut ReadBuffer, total_on_wire: usize) -> CResult<()> {
    let base = buf.message_end;
    let end = base + total_on_wire;
    let mut read_at = base;
    let mut write_at = base;
    while read_at < end {
        let (len, _) = parse_header(&buf.storage[read_at..end])?
            .expect("full frame already validated by try_reassemble");
        buf.storage.copy_within(read_at + HEADER_SIZE..read_at + HEADER_SIZE + len, write_at);
        write_at += len;
        read_at += HEADER_SIZE + len;
    }
    let logical_len = write_at - base;
    // shift any trailing pending bytes (start of the *next* message) left to
    // close the gap left by removed headers.
    let trailing = buf.pending_end - end;
    buf.storage.copy_within(end..buf.pending_end, write_at);
    buf.message_end = base + logical_len;
    buf.pending_end = write_at + trailing;
    Ok(())
}

/// Splits `payload` into wire frames, writing each header + chunk into `out`
/// Returns the next sequence number for the opposite
/// direction.
pub fn write_framed(out: &mut Vec<u8>, payload: &[u8], start_seq: SequenceNumber) -> SequenceNumber {
    let mut seq = start_seq.0;
    let mut offset = 0;
    loop {
        let chunk_len = (payload.len() - offset).min(MAX_FRAME_PAYLOAD);
        out.write_u24::<LittleEndian>(chunk_len as u32).expect("write to Vec never fails");
        out.write_u8(seq).expect("write to Vec never fails");
        out.extend_from_slice(&payload[offset..offset + chunk_len]);
        seq = seq.wrapping_add(1);
        offset += chunk_len;
        if chunk_len < MAX_FRAME_PAYLOAD {
            break;
        }
        if offset == payload.len() {
            // exact multiple: emit a trailing zero-length frame.
            out.write_u24::<LittleEndian>(0).expect("write to Vec never fails");
            out.write_u8(seq).expect("write to Vec never fails");
            seq = seq.wrapping_add(1);
            break;
        }
    }
    SequenceNumber(seq)
}

/// Number of frames `write_framed` would emit for a payload of length `len`,
/// Exposed for tests and for callers that
/// need to predict the resulting sequence number without serializing.
pub fn frame_count(len: usize) -> usize {
    if len == 0 {
        return 1;
    }
    let whole = (len + MAX_FRAME_PAYLOAD - 1) / MAX_FRAME_PAYLOAD;
    if len % MAX_FRAME_PAYLOAD == 0 {
        whole + 1
    } else {
        whole
    }
}

#[cfg(test)]
mod frame_count_test {
    use super::*;

    #[test]
    fn matches_write_framed_seq_advance() {
        for &len in &[0usize, 1, MAX_FRAME_PAYLOAD, MAX_FRAME_PAYLOAD + 1, MAX_FRAME_PAYLOAD * 2] {
            let payload = vec![0u8; len];
            let mut wire = Vec::new();
            let next = write_framed(&mut wire, &payload, SequenceNumber(0));
            assert_eq!(next.0 as usize, frame_count(len) % 256);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(buf: &mut ReadBuffer, bytes: &[u8]) {
        let dst = buf.free_mut(bytes.len());
        dst[..bytes.len()].copy_from_slice(bytes);
        buf.commit_read(bytes.len());
    }

    #[test]
    fn single_frame_round_trip() {
        let payload = b"hello mysql".to_vec();
        let mut wire = Vec::new();
        let next = write_framed(&mut wire, &payload, SequenceNumber(5));
        assert_eq!(next.0, 6);

        let mut buf = ReadBuffer::new();
        feed(&mut buf, &wire);
        let next_seq = try_reassemble(&mut buf, SequenceNumber(5)).unwrap().unwrap();
        assert_eq!(buf.current_message(), payload.as_slice());
        assert_eq!(next_seq, 6);
    }

    #[test]
    fn exact_multiple_gets_trailing_zero_frame() {
        let payload = vec![0xAB; MAX_FRAME_PAYLOAD];
        let mut wire = Vec::new();
        let next = write_framed(&mut wire, &payload, SequenceNumber(0));
        // one full frame + one zero-length continuation
        assert_eq!(next.0, 2);
        assert_eq!(wire.len(), HEADER_SIZE + MAX_FRAME_PAYLOAD + HEADER_SIZE);

        let mut buf = ReadBuffer::new();
        feed(&mut buf, &wire);
        let next_seq = try_reassemble(&mut buf, SequenceNumber(0)).unwrap().unwrap();
        assert_eq!(buf.current_message().len(), payload.len());
        assert_eq!(next_seq, 2);
    }

    #[test]
    fn multi_frame_message_reassembles_contiguously() {
        let payload: Vec<u8> = (0..(MAX_FRAME_PAYLOAD + 1000)).map(|i| (i % 251) as u8).collect();
        let mut wire = Vec::new();
        let next = write_framed(&mut wire, &payload, SequenceNumber(250));
        assert_eq!(next.0, 252u8.wrapping_add(0)); // 250 -> 251 -> 252, wraps within u8 math implicitly

        let mut buf = ReadBuffer::new();
        feed(&mut buf, &wire);
        try_reassemble(&mut buf, SequenceNumber(250)).unwrap().unwrap();
        assert_eq!(buf.current_message(), payload.as_slice());
    }

    #[test]
    fn sequence_mismatch_is_fatal() {
        let payload = b"x".to_vec();
        let mut wire = Vec::new();
        write_framed(&mut wire, &payload, SequenceNumber(9));

        let mut buf = ReadBuffer::new();
        feed(&mut buf, &wire);
        let err = try_reassemble(&mut buf, SequenceNumber(0)).unwrap_err();
        assert!(matches!(err, ReError::Framing(_)));
    }

    #[test]
    fn incomplete_header_waits_for_more_bytes() {
        let mut buf = ReadBuffer::new();
        feed(&mut buf, &[1, 0]); // only 2 of 4 header bytes
        assert!(try_reassemble(&mut buf, SequenceNumber(0)).unwrap().is_none());
    }
}
