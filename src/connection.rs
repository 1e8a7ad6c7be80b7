use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::Frame;
use crate::Error;

/// A framed TCP stream. Data is read from the socket into the codec's read buffer; when a frame
/// is parsed, the corresponding data is removed from the buffer.
pub struct Connection {
    pub id: Uuid,
    frames: Framed<TcpStream, FrameCodec>,
}

impl Connection {
    /// Server side of a connection: reads commands, writes replies.
    pub fn new(stream: TcpStream) -> Connection {
        Connection::with_codec(stream, FrameCodec::server())
    }

    /// Client side of a connection: writes commands, reads replies.
    pub fn client(stream: TcpStream) -> Connection {
        Connection::with_codec(stream, FrameCodec::client())
    }

    fn with_codec(stream: TcpStream, codec: FrameCodec) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            frames: Framed::new(stream, codec),
        }
    }

    /// Waits for the next complete frame.
    ///
    /// Returns `None` when the peer closed the connection between frames. A close in the middle
    /// of a frame, or malformed data, is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.frames.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        self.frames.send(frame).await
    }
}
