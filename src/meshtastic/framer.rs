//! Length-prefixed stream framer for the Meshtastic client API.
//!
//! Both the serial and the TCP link carry protobuf messages as:
//!
//!   `0x94 0xC3 <len_hi> <len_lo> <protobuf bytes>`
//!
//! The framer can be fed arbitrary chunks and yields whole frames when available. Bytes that
//! sit outside a frame are the device's debug console; they are collected and handed out as
//! text lines so the caller can log them.
use bytes::{Buf, BytesMut};
use thiserror::Error;

pub const START1: u8 = 0x94;
pub const START2: u8 = 0xC3;
pub const HEADER_LEN: usize = 4;
/// Largest protobuf the firmware accepts in one frame.
pub const MAX_FRAME_LEN: usize = 512;

/// Console text without a newline is flushed once it grows past this.
const MAX_CONSOLE_LINE: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("empty frame payload")]
    Empty,
}

pub struct StreamFramer {
    buf: BytesMut,
    console: Vec<u8>,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            console: Vec::new(),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete frame payload, if one is buffered. Garbage in front of a
    /// header is moved to the console buffer; a header declaring an empty or oversized
    /// payload is treated as garbage too and the scan restarts one byte later.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match find_header_start(&self.buf) {
                Some(0) => {}
                Some(pos) => {
                    let junk = self.buf.split_to(pos);
                    self.console.extend_from_slice(&junk);
                }
                None => {
                    // a lone trailing START1 may be the first half of a header
                    let keep = usize::from(self.buf.last() == Some(&START1));
                    let junk = self.buf.split_to(self.buf.len() - keep);
                    self.console.extend_from_slice(&junk);
                    return None;
                }
            }
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            let declared = ((self.buf[2] as usize) << 8) | (self.buf[3] as usize);
            if declared == 0 || declared > MAX_FRAME_LEN {
                let junk = self.buf.split_to(1);
                self.console.extend_from_slice(&junk);
                continue;
            }
            if self.buf.len() < HEADER_LEN + declared {
                return None;
            }
            self.buf.advance(HEADER_LEN);
            return Some(self.buf.split_to(declared).to_vec());
        }
    }

    /// Drain complete console lines (newline terminated, `\r` stripped). Partial text stays
    /// buffered unless it has grown unreasonably long.
    pub fn take_console_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.console.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.console.drain(..=pos).collect();
            push_console_line(&mut lines, &line[..line.len() - 1]);
        }
        if self.console.len() > MAX_CONSOLE_LINE {
            let line: Vec<u8> = self.console.drain(..).collect();
            push_console_line(&mut lines, &line);
        }
        lines
    }
}

fn push_console_line(lines: &mut Vec<String>, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches('\r');
    if !text.trim().is_empty() {
        lines.push(text.to_string());
    }
}

/// Position of the first byte that can start a header: `START1 START2`, or `START1` as the
/// final buffered byte.
fn find_header_start(buf: &[u8]) -> Option<usize> {
    buf.iter().enumerate().position(|(i, &b)| {
        b == START1 && buf.get(i + 1).map_or(true, |&next| next == START2)
    })
}

/// Prefix a protobuf payload with the stream header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::Empty);
    }
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(START1);
    out.push(START2);
    out.push(((payload.len() >> 8) & 0xFF) as u8);
    out.push((payload.len() & 0xFF) as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_frame_split_across_pushes() {
        let frame = encode_frame(&[1, 2, 3, 4, 5]).unwrap();
        let mut f = StreamFramer::new();
        f.push(&frame[..3]);
        assert!(f.next_frame().is_none());
        f.push(&frame[3..]);
        assert_eq!(f.next_frame(), Some(vec![1, 2, 3, 4, 5]));
        assert!(f.next_frame().is_none());
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn false_start_byte_does_not_stall() {
        let mut f = StreamFramer::new();
        let mut data = vec![START1, 0x00, b'x'];
        data.extend(encode_frame(&[9]).unwrap());
        f.push(&data);
        assert_eq!(f.next_frame(), Some(vec![9]));
    }

    #[test]
    fn console_text_is_split_into_lines() {
        let mut f = StreamFramer::new();
        f.push(b"INFO boot ok\r\nDEBUG par");
        assert!(f.next_frame().is_none());
        assert_eq!(f.take_console_lines(), vec!["INFO boot ok".to_string()]);
        f.push(b"tial\n");
        assert!(f.next_frame().is_none());
        assert_eq!(f.take_console_lines(), vec!["DEBUG partial".to_string()]);
    }

    #[test]
    fn encode_rejects_oversize() {
        let big = vec![0u8; MAX_FRAME_LEN + 1];
        assert_eq!(
            encode_frame(&big),
            Err(FrameError::TooLarge {
                len: MAX_FRAME_LEN + 1,
                max: MAX_FRAME_LEN
            })
        );
        assert_eq!(encode_frame(&[]), Err(FrameError::Empty));
    }
}
