//! Async client for a memdis server.
//!
//! [`Client::command`] sends any command and hands back the raw reply. The typed helpers turn
//! error replies into `Err`.

use bytes::Bytes;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, instrument};

use crate::connection::Connection;
use crate::frame::Frame;
use crate::Error;

/// Backed by a single `TcpStream`.
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Establish a connection with the server located at `addr`.
    pub async fn connect<T: ToSocketAddrs>(addr: T) -> Result<Client, Error> {
        let stream = TcpStream::connect(addr).await?;
        let connection = Connection::client(stream);

        Ok(Client { connection })
    }

    /// Sends `args` as a command and waits for the reply. Error replies are returned as
    /// `Frame::Error`, not as `Err`.
    pub async fn command<I, T>(&mut self, args: I) -> Result<Frame, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        let frame = Frame::command(args);
        debug!(request = ?frame);

        self.connection.write_frame(frame).await?;

        match self.connection.read_frame().await? {
            Some(frame) => {
                debug!(response = ?frame);
                Ok(frame)
            }
            None => Err("connection reset by server".into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn ping(&mut self, msg: Option<Bytes>) -> Result<Bytes, Error> {
        let mut args = vec![Bytes::from("PING")];
        args.extend(msg);

        match self.command(args).await? {
            Frame::Simple(value) => Ok(value.into()),
            Frame::Bulk(value) => Ok(value),
            frame => Err(unexpected(frame)),
        }
    }

    /// Get the value of key. If the key does not exist `None` is returned.
    #[instrument(skip(self))]
    pub async fn get(&mut self, key: &str) -> Result<Option<Bytes>, Error> {
        match self.command([Bytes::from("GET"), key_bytes(key)]).await? {
            Frame::Bulk(value) => Ok(Some(value)),
            Frame::NullBulkString => Ok(None),
            frame => Err(unexpected(frame)),
        }
    }

    /// Set `key` to hold the given `value`.
    #[instrument(skip(self))]
    pub async fn set(&mut self, key: &str, value: Bytes) -> Result<(), Error> {
        match self.command([Bytes::from("SET"), key_bytes(key), value]).await? {
            Frame::Simple(s) if s == "OK" => Ok(()),
            frame => Err(unexpected(frame)),
        }
    }

    /// Appends `value` to the list at `key`, returning the new length.
    #[instrument(skip(self))]
    pub async fn rpush(&mut self, key: &str, value: Bytes) -> Result<i64, Error> {
        match self.command([Bytes::from("RPUSH"), key_bytes(key), value]).await? {
            Frame::Integer(len) => Ok(len),
            frame => Err(unexpected(frame)),
        }
    }

    #[instrument(skip(self))]
    pub async fn llen(&mut self, key: &str) -> Result<i64, Error> {
        match self.command([Bytes::from("LLEN"), key_bytes(key)]).await? {
            Frame::Integer(len) => Ok(len),
            frame => Err(unexpected(frame)),
        }
    }
}

fn key_bytes(key: &str) -> Bytes {
    Bytes::copy_from_slice(key.as_bytes())
}

fn unexpected(frame: Frame) -> Error {
    match frame {
        Frame::Error(msg) => msg.into(),
        frame => format!("unexpected frame: {}", frame).into(),
    }
}
