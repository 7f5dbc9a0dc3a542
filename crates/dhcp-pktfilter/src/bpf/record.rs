//! Splitting a BSD BPF read buffer into capture records.
//!
//! A single `read(2)` on a BPF device returns zero or more records, each a
//! `struct bpf_hdr` followed by the captured bytes, padded to the BPF word
//! alignment.

use std::mem::size_of;

/// Width of `bh_tstamp`. Darwin and OpenBSD use a 32-bit timeval pair.
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "openbsd"))]
pub const TIMESTAMP_LEN: usize = 8;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "openbsd")))]
pub const TIMESTAMP_LEN: usize = size_of::<libc::timeval>();

/// Record alignment used by `BPF_WORDALIGN`.
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "openbsd"))]
pub const WORD_ALIGNMENT: usize = size_of::<u32>();
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "openbsd")))]
pub const WORD_ALIGNMENT: usize = size_of::<libc::c_long>();

/// Fixed part of `struct bpf_hdr` before padding: timestamp, caplen,
/// datalen, hdrlen.
pub const MIN_HEADER_LEN: usize = TIMESTAMP_LEN + 4 + 4 + 2;

pub const fn word_align(len: usize) -> usize {
    (len + (WORD_ALIGNMENT - 1)) & !(WORD_ALIGNMENT - 1)
}

/// One capture record borrowed from a read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpfRecord<'a> {
    /// Bytes on the wire.
    pub datalen: u32,
    /// Captured bytes; shorter than `datalen` when the snap length cut it.
    pub data: &'a [u8],
}

impl BpfRecord<'_> {
    pub fn is_complete(&self) -> bool {
        self.data.len() as u32 == self.datalen
    }
}

/// Iterator over the records in one read buffer. Stops at the first
/// malformed header.
pub struct Records<'a> {
    buf: &'a [u8],
    offset: usize,
}

pub fn records(buf: &[u8]) -> Records<'_> {
    Records { buf, offset: 0 }
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let b = buf.get(at..at + 4)?;
    Some(u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let b = buf.get(at..at + 2)?;
    Some(u16::from_ne_bytes([b[0], b[1]]))
}

impl<'a> Iterator for Records<'a> {
    type Item = BpfRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.offset;
        if self.buf.len().saturating_sub(start) < MIN_HEADER_LEN {
            return None;
        }

        let caplen = read_u32(self.buf, start + TIMESTAMP_LEN)? as usize;
        let datalen = read_u32(self.buf, start + TIMESTAMP_LEN + 4)?;
        let hdrlen = read_u16(self.buf, start + TIMESTAMP_LEN + 8)? as usize;
        if hdrlen < MIN_HEADER_LEN {
            self.offset = self.buf.len();
            return None;
        }

        let data_start = start + hdrlen;
        let data_end = data_start.checked_add(caplen)?;
        let Some(data) = self.buf.get(data_start..data_end) else {
            self.offset = self.buf.len();
            return None;
        };

        self.offset = start + word_align(hdrlen + caplen);
        Some(BpfRecord { datalen, data })
    }
}

/// First record in `buf` that was captured in full. Truncated records
/// (caplen != datalen) are skipped.
pub fn first_complete_frame(buf: &[u8]) -> Option<&[u8]> {
    records(buf).find(BpfRecord::is_complete).map(|r| r.data)
}

#[cfg(test)]
pub(crate) fn push_record(buf: &mut Vec<u8>, data: &[u8], datalen: u32) {
    let hdrlen = word_align(MIN_HEADER_LEN);
    let start = buf.len();
    buf.resize(start + hdrlen, 0);
    buf[start + TIMESTAMP_LEN..start + TIMESTAMP_LEN + 4]
        .copy_from_slice(&(data.len() as u32).to_ne_bytes());
    buf[start + TIMESTAMP_LEN + 4..start + TIMESTAMP_LEN + 8]
        .copy_from_slice(&datalen.to_ne_bytes());
    buf[start + TIMESTAMP_LEN + 8..start + TIMESTAMP_LEN + 10]
        .copy_from_slice(&(hdrlen as u16).to_ne_bytes());
    buf.extend_from_slice(data);
    buf.resize(start + word_align(hdrlen + data.len()), 0);
}
