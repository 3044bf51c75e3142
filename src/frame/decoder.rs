// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The VE.Direct frame decoder state machine.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::SerialError;
use crate::frame::Frame;

/// The reserved label terminating a frame.
const CHECKSUM_LABEL: &str = "Checksum";

/// Leading marker of an embedded HEX-protocol message.
const HEX_MARKER: u8 = b':';

/// Read buffer size. VE.Direct frames are small; one fill usually covers
/// several records.
const READ_BUF: usize = 256;

/// Decoder position within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Between records: consuming `\r`/`\n`, watching for the next label
    /// or a HEX marker.
    AwaitingLabel,
    /// Accumulating a label up to the `\t` separator.
    ReadingLabel,
    /// Accumulating a value up to the `\r` terminator.
    ReadingValue,
    /// The next byte is the checksum byte.
    ReadingChecksum,
    /// Skipping an embedded HEX message up to its `\n` terminator.
    InEmbeddedFrame,
}

/// Decodes validated VE.Direct frames from an async byte stream.
///
/// Exactly one task reads from a decoder; frames are handed out one at a
/// time and corrupt frames are discarded internally.
///
/// # Examples
///
/// ```
/// use vedirect_bridge::FrameDecoder;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// // A one-record frame; the trailing byte balances the checksum.
/// let bytes = b"\r\nPPV\t89\r\nChecksum\t\x26".to_vec();
/// let mut decoder = FrameDecoder::new(bytes.as_slice(), Duration::from_secs(1));
///
/// let frame = decoder.read_frame().await.unwrap();
/// assert_eq!(frame.get("PPV"), Some("89"));
/// # }
/// ```
#[derive(Debug)]
pub struct FrameDecoder<R> {
    reader: R,
    read_timeout: Duration,
    buf: [u8; READ_BUF],
    filled: usize,
    pos: usize,
    checksum_failures: u64,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    /// Creates a decoder over an async byte stream.
    ///
    /// `read_timeout` bounds each underlying read: a device that goes
    /// silent surfaces as [`SerialError::Timeout`].
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader,
            read_timeout,
            buf: [0; READ_BUF],
            filled: 0,
            pos: 0,
            checksum_failures: 0,
        }
    }

    /// Number of frames discarded for a checksum mismatch so far.
    #[must_use]
    pub fn checksum_failures(&self) -> u64 {
        self.checksum_failures
    }

    /// Reads the next complete, checksum-valid frame.
    ///
    /// Suspends until a whole frame is available; never yields a partial
    /// one. Frames failing their checksum are discarded silently and
    /// decoding resumes at the next frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError`] on read timeout, underlying I/O failure or
    /// end of stream. These are fatal to the session and propagate so the
    /// supervisor can tear down and retry.
    pub async fn read_frame(&mut self) -> Result<Frame, SerialError> {
        let mut state = DecodeState::AwaitingLabel;
        let mut sum: u8 = 0;
        let mut label: Vec<u8> = Vec::with_capacity(16);
        let mut value: Vec<u8> = Vec::with_capacity(32);
        let mut fields: HashMap<String, String> = HashMap::new();

        loop {
            let byte = self.next_byte().await?;

            match state {
                DecodeState::AwaitingLabel => match byte {
                    HEX_MARKER => state = DecodeState::InEmbeddedFrame,
                    b'\r' | b'\n' => sum = sum.wrapping_add(byte),
                    _ => {
                        sum = sum.wrapping_add(byte);
                        label.push(byte);
                        state = DecodeState::ReadingLabel;
                    }
                },
                DecodeState::ReadingLabel => {
                    sum = sum.wrapping_add(byte);
                    if byte == b'\t' {
                        state = if label == CHECKSUM_LABEL.as_bytes() {
                            DecodeState::ReadingChecksum
                        } else {
                            DecodeState::ReadingValue
                        };
                    } else {
                        label.push(byte);
                    }
                }
                DecodeState::ReadingValue => {
                    sum = sum.wrapping_add(byte);
                    if byte == b'\r' {
                        fields.insert(
                            String::from_utf8_lossy(&label).into_owned(),
                            String::from_utf8_lossy(&value).into_owned(),
                        );
                        label.clear();
                        value.clear();
                        state = DecodeState::AwaitingLabel;
                    } else {
                        value.push(byte);
                    }
                }
                DecodeState::ReadingChecksum => {
                    sum = sum.wrapping_add(byte);
                    if sum == 0 {
                        return Ok(Frame::new(fields));
                    }

                    self.checksum_failures += 1;
                    tracing::debug!(
                        residue = sum,
                        fields = fields.len(),
                        "Discarding frame with checksum mismatch"
                    );
                    fields.clear();
                    label.clear();
                    value.clear();
                    sum = 0;
                    state = DecodeState::AwaitingLabel;
                }
                DecodeState::InEmbeddedFrame => {
                    // HEX bytes are opaque: never summed, never recorded.
                    if byte == b'\n' {
                        state = DecodeState::AwaitingLabel;
                    }
                }
            }
        }
    }

    async fn next_byte(&mut self) -> Result<u8, SerialError> {
        if self.pos == self.filled {
            let read = tokio::time::timeout(self.read_timeout, self.reader.read(&mut self.buf))
                .await
                .map_err(|_| SerialError::Timeout(self.read_timeout.as_secs()))??;
            if read == 0 {
                return Err(SerialError::Closed);
            }
            self.filled = read;
            self.pos = 0;
        }

        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Appends records and the balancing checksum record to `out`.
    fn push_frame(out: &mut Vec<u8>, records: &[(&str, &str)]) {
        let mut sum: u8 = 0;
        let mut frame = Vec::new();
        for (label, val) in records {
            frame.extend_from_slice(b"\r\n");
            frame.extend_from_slice(label.as_bytes());
            frame.push(b'\t');
            frame.extend_from_slice(val.as_bytes());
        }
        frame.extend_from_slice(b"\r\nChecksum\t");
        for &b in &frame {
            sum = sum.wrapping_add(b);
        }
        frame.push(0u8.wrapping_sub(sum));
        out.extend_from_slice(&frame);
    }

    fn decoder(bytes: Vec<u8>) -> FrameDecoder<std::io::Cursor<Vec<u8>>> {
        FrameDecoder::new(std::io::Cursor::new(bytes), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn decodes_single_frame() {
        let mut bytes = Vec::new();
        push_frame(&mut bytes, &[("V", "24100"), ("I", "1500"), ("PPV", "89")]);

        let mut dec = decoder(bytes);
        let frame = dec.read_frame().await.unwrap();

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.get("V"), Some("24100"));
        assert_eq!(frame.get("I"), Some("1500"));
        assert_eq!(frame.get("PPV"), Some("89"));
        // The checksum record never reaches the field map.
        assert_eq!(frame.get("Checksum"), None);
    }

    #[tokio::test]
    async fn decodes_consecutive_frames() {
        let mut bytes = Vec::new();
        push_frame(&mut bytes, &[("V", "12800")]);
        push_frame(&mut bytes, &[("V", "12900")]);

        let mut dec = decoder(bytes);
        assert_eq!(dec.read_frame().await.unwrap().get("V"), Some("12800"));
        assert_eq!(dec.read_frame().await.unwrap().get("V"), Some("12900"));
    }

    #[tokio::test]
    async fn discards_corrupt_frame_and_resumes() {
        let mut bytes = Vec::new();
        push_frame(&mut bytes, &[("V", "12800")]);
        // Flip a value byte after the checksum was computed.
        let idx = bytes.iter().position(|&b| b == b'8').unwrap();
        bytes[idx] = b'9';
        push_frame(&mut bytes, &[("V", "13000")]);

        let mut dec = decoder(bytes);
        let frame = dec.read_frame().await.unwrap();

        assert_eq!(frame.get("V"), Some("13000"));
        assert_eq!(dec.checksum_failures(), 1);
    }

    #[tokio::test]
    async fn malformed_span_yields_no_frame() {
        // A frame missing its checksum record, then a well-formed one. The
        // stray bytes fold into the next frame's sum and poison it, so the
        // decoder must discard both spans and emit only the third frame.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"\r\nV\t12800");
        push_frame(&mut bytes, &[("V", "13000")]);
        push_frame(&mut bytes, &[("V", "13100")]);

        let mut dec = decoder(bytes);
        let frame = dec.read_frame().await.unwrap();

        assert_eq!(frame.get("V"), Some("13100"));
        assert_eq!(dec.checksum_failures(), 1);
    }

    #[tokio::test]
    async fn skips_embedded_hex_frame() {
        let mut bytes = Vec::new();
        push_frame(&mut bytes, &[("V", "24100")]);
        // Splice a HEX message at the record boundary before the checksum.
        let split = bytes.windows(10).position(|w| w == b"\r\nChecksum").unwrap() + 2;
        bytes.splice(split..split, b":A0102000543\n".iter().copied());

        let mut dec = decoder(bytes);
        let frame = dec.read_frame().await.unwrap();

        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get("V"), Some("24100"));
        assert_eq!(dec.checksum_failures(), 0);
    }

    #[tokio::test]
    async fn hex_frame_before_first_record() {
        let mut bytes: Vec<u8> = b":451\n".to_vec();
        push_frame(&mut bytes, &[("SOC", "934")]);

        let mut dec = decoder(bytes);
        let frame = dec.read_frame().await.unwrap();
        assert_eq!(frame.get("SOC"), Some("934"));
    }

    #[tokio::test]
    async fn end_of_stream_is_fatal() {
        let mut dec = decoder(b"\r\nV\t128".to_vec());
        let err = dec.read_frame().await.unwrap_err();
        assert!(matches!(err, SerialError::Closed));
    }

    #[tokio::test]
    async fn silent_stream_times_out() {
        // A duplex stream with no writer activity never yields bytes.
        let (reader, _writer) = tokio::io::duplex(64);
        let mut dec = FrameDecoder::new(reader, Duration::from_millis(20));

        let err = dec.read_frame().await.unwrap_err();
        assert!(matches!(err, SerialError::Timeout(_)));
    }

    #[tokio::test]
    async fn frame_split_across_reads() {
        let mut bytes = Vec::new();
        push_frame(&mut bytes, &[("V", "25600"), ("T", "21")]);

        // Deliver the frame in two chunks over a duplex pipe.
        let (reader, mut writer) = tokio::io::duplex(64);
        let mid = bytes.len() / 2;
        let (first, second) = (bytes[..mid].to_vec(), bytes[mid..].to_vec());
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            writer.write_all(&first).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.write_all(&second).await.unwrap();
        });

        let mut dec = FrameDecoder::new(reader, Duration::from_secs(1));
        let frame = dec.read_frame().await.unwrap();
        assert_eq!(frame.get("V"), Some("25600"));
        assert_eq!(frame.get("T"), Some("21"));
    }
}
