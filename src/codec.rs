use bytes::{Buf, BytesMut};
use std::env;
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::frame::{self, Frame};
use crate::Error;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Frames RESP values on a byte stream.
///
/// Bytes are buffered until a whole frame is available, so a frame split over any number of
/// reads decodes the same as one delivered at once. A server decodes commands (which may also be
/// inline lines), a client decodes replies.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    accept_inline: bool,
    max_frame_size: usize,
}

impl FrameCodec {
    /// Codec for the server side of a connection: decodes commands, encodes replies.
    pub fn server() -> FrameCodec {
        FrameCodec {
            accept_inline: true,
            max_frame_size: FrameCodec::max_frame_size(),
        }
    }

    /// Codec for the client side of a connection: encodes commands, decodes replies.
    pub fn client() -> FrameCodec {
        FrameCodec {
            accept_inline: false,
            max_frame_size: FrameCodec::max_frame_size(),
        }
    }

    fn max_frame_size() -> usize {
        match env::var("MAX_FRAME_SIZE") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                warn!(%value, "MAX_FRAME_SIZE is not a number, using the default");
                DEFAULT_MAX_FRAME_SIZE
            }),
            Err(_) => DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let parsed = if self.accept_inline {
            Frame::parse_command(&mut cursor)
        } else {
            Frame::parse(&mut cursor)
        };

        let frame = match parsed {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                // Check if the frame size exceeds a certain limit to prevent DoS attacks
                if src.len() > self.max_frame_size {
                    return Err("protocol error; frame size exceeds limit".into());
                }
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&frame.serialize());
        Ok(())
    }
}
