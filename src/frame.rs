// https://redis.io/docs/reference/protocol-spec

use std::fmt;

use bytes::Buf;
use bytes::Bytes;
use std::io::Cursor;
use std::string::FromUtf8Error;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

/// Arrays nested deeper than this are rejected instead of parsed.
const MAX_NESTING: usize = 32;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    /// Invalid message encoding.
    #[error("{0}")]
    Other(crate::Error),
}

/// A single RESP2 value, as sent by clients (commands) and servers (replies).
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    /// `$-1\r\n`, a missing value.
    NullBulkString,
    /// `*-1\r\n`, a missing array.
    NullArray,
    Array(Vec<Frame>),
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Builds the multi-bulk array a client sends for a command.
    pub fn command<I, T>(args: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Frame::Array(args.into_iter().map(|arg| Frame::Bulk(arg.into())).collect())
    }

    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let bytes = get_line(src)?.to_vec();
                let string = String::from_utf8(bytes)?;
                Ok(Frame::Simple(string))
            }
            DataType::SimpleError => {
                let bytes = get_line(src)?.to_vec();
                let string = String::from_utf8(bytes)?;
                Ok(Frame::Error(string))
            }
            DataType::Integer => {
                let integer = get_decimal(src)?;
                Ok(Frame::Integer(integer))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = get_decimal(src)?;

                if length == -1 {
                    return Ok(Frame::NullBulkString);
                }

                let length = usize::try_from(length)
                    .map_err(|_| format!("protocol error; invalid bulk length {}", length))?;

                // The payload is binary safe, so it is read by length and never scanned for CRLF.
                if src.remaining() < length + CRLF.len() {
                    return Err(Error::Incomplete);
                }

                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + length]);
                src.advance(length);

                if src.chunk()[..CRLF.len()] != CRLF[..] {
                    return Err("protocol error; bulk string is not terminated by CRLF".into());
                }
                src.advance(CRLF.len());

                Ok(Frame::Bulk(data))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                if depth >= MAX_NESTING {
                    return Err("protocol error; arrays are nested too deeply".into());
                }

                let length = get_decimal(src)?;

                if length == -1 {
                    return Ok(Frame::NullArray);
                }

                let length = usize::try_from(length)
                    .map_err(|_| format!("protocol error; invalid array length {}", length))?;

                // Do not trust the announced length for the allocation, the elements may never
                // arrive.
                let mut frames = Vec::with_capacity(length.min(1024));
                for _ in 0..length {
                    let frame = Self::parse_nested(src, depth + 1)?;
                    frames.push(frame);
                }

                Ok(Frame::Array(frames))
            }
        }
    }

    /// Parses a command sent to the server.
    ///
    /// Commands normally arrive as a RESP array of bulk strings. Anything that does not start
    /// with `*` is treated as an inline command: a single line split on whitespace, where a
    /// `"quoted string"` is kept as one argument. The result is always an array of bulk strings.
    /// Blank inline lines are skipped.
    pub fn parse_command(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        loop {
            if !src.has_remaining() {
                return Err(Error::Incomplete);
            }

            if src.chunk()[0] == u8::from(DataType::Array) {
                return Self::parse(src);
            }

            let line = get_inline_line(src)?;
            let tokens = tokenize(line);
            if !tokens.is_empty() {
                return Ok(Frame::command(tokens));
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let i = i.to_string();
                let mut bytes = Vec::with_capacity(1 + i.len() + CRLF.len());
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(i.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(bytes) => {
                let length_str = bytes.len().to_string();
                let mut result = Vec::with_capacity(
                    1 + length_str.len() + CRLF.len() + bytes.len() + CRLF.len(),
                );
                result.push(u8::from(DataType::BulkString));
                result.extend_from_slice(length_str.as_bytes());
                result.extend_from_slice(CRLF);
                result.extend_from_slice(bytes);
                result.extend_from_slice(CRLF);
                result
            }
            Frame::NullBulkString => b"$-1\r\n".to_vec(),
            Frame::NullArray => b"*-1\r\n".to_vec(),
            Frame::Array(arr) => {
                let length_str = arr.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length_str.len() + CRLF.len());
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }

    // redis-cli style rendering; nested array items are indented under their index.
    fn write_display(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(i) => write!(f, "(integer) {}", i),
            Frame::Bulk(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Frame::NullBulkString | Frame::NullArray => write!(f, "(nil)"),
            Frame::Array(arr) if arr.is_empty() => write!(f, "(empty array)"),
            Frame::Array(arr) => {
                for (i, frame) in arr.iter().enumerate() {
                    let prefix = format!("{}) ", i + 1);
                    if i > 0 {
                        write!(f, "\n{:indent$}", "", indent = indent)?;
                    }
                    write!(f, "{}", prefix)?;
                    frame.write_display(f, indent + prefix.len())?;
                }
                Ok(())
            }
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_display(f, 0)
    }
}

/// Splits an inline command line into arguments.
///
/// Arguments are separated by ASCII whitespace. A token starting with `"` runs until the next
/// `"` and may contain whitespace; the quotes are stripped. An unterminated quote is taken
/// verbatim up to the next whitespace.
pub fn tokenize(line: &[u8]) -> Vec<Bytes> {
    let mut tokens = vec![];
    let mut pos = 0;

    while pos < line.len() {
        if line[pos].is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if line[pos] == b'"' {
            let closing = line[pos + 1..].iter().position(|&b| b == b'"');
            if let Some(closing) = closing {
                let end = pos + 1 + closing;
                tokens.push(Bytes::copy_from_slice(&line[pos + 1..end]));
                pos = end + 1;
                continue;
            }
        }

        let start = pos;
        while pos < line.len() && !line[pos].is_ascii_whitespace() {
            pos += 1;
        }
        tokens.push(Bytes::copy_from_slice(&line[start..pos]));
    }

    tokens
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let end = src.get_ref().len();

    let frame_end_position = src.get_ref()[start..end]
        .windows(2)
        .position(|window| window == CRLF)
        .ok_or(Error::Incomplete)
        .map(|index| start + index)?;

    src.set_position((frame_end_position + CRLF.len()) as u64);

    Ok(&src.get_ref()[start..frame_end_position])
}

// Inline commands typed by hand may end with a bare `\n`.
fn get_inline_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let data = &src.get_ref()[start..];

    let newline = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(Error::Incomplete)?;

    src.set_position((start + newline + 1) as u64);

    let line = &data[..newline];
    Ok(line.strip_suffix(b"\r").unwrap_or(line))
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line(src)?;
    let string = String::from_utf8(line.to_vec())?;
    string
        .parse::<i64>()
        .map_err(|_| format!("protocol error; invalid number {:?}", string).into())
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_src: FromUtf8Error) -> Error {
        "protocol error; invalid frame format".into()
    }
}

impl From<&str> for Error {
    fn from(src: &str) -> Error {
        src.to_string().into()
    }
}

impl From<String> for Error {
    fn from(src: String) -> Error {
        Error::Other(src.into())
    }
}
