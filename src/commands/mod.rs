pub mod dbsize;
pub mod del;
pub mod echo;
pub mod executable;
pub mod exists;
pub mod expire;
pub mod flushall;
pub mod get;
pub mod hdel;
pub mod hexists;
pub mod hget;
pub mod hgetall;
pub mod hkeys;
pub mod hlen;
pub mod hmset;
pub mod hset;
pub mod hvals;
pub mod keys;
pub mod lindex;
pub mod llen;
pub mod lpop;
pub mod lpush;
pub mod lrange;
pub mod lrem;
pub mod lset;
pub mod persist;
pub mod ping;
pub mod rename;
pub mod rpop;
pub mod rpush;
pub mod set;
pub mod ttl;
pub mod type_;

use bytes::Bytes;
use std::{str, vec};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

use dbsize::DBSize;
use del::Del;
use echo::Echo;
use exists::Exists;
use expire::Expire;
use flushall::FlushAll;
use get::Get;
use hdel::Hdel;
use hexists::Hexists;
use hget::Hget;
use hgetall::Hgetall;
use hkeys::Hkeys;
use hlen::Hlen;
use hmset::Hmset;
use hset::Hset;
use hvals::Hvals;
use keys::Keys;
use lindex::Lindex;
use llen::Llen;
use lpop::Lpop;
use lpush::Lpush;
use lrange::Lrange;
use lrem::Lrem;
use lset::Lset;
use persist::Persist;
use ping::Ping;
use rename::Rename;
use rpop::Rpop;
use rpush::Rpush;
use set::Set;
use ttl::Ttl;
use type_::Type;

#[derive(Debug, PartialEq)]
pub enum Command {
    DBsize(DBSize),
    Del(Del),
    Exists(Exists),
    Expire(Expire),
    FlushAll(FlushAll),
    Get(Get),
    Keys(Keys),
    Persist(Persist),
    Rename(Rename),
    Set(Set),
    Ttl(Ttl),
    Type(Type),

    Lindex(Lindex),
    Llen(Llen),
    Lpop(Lpop),
    Lpush(Lpush),
    Lrange(Lrange),
    Lrem(Lrem),
    Lset(Lset),
    Rpop(Rpop),
    Rpush(Rpush),

    Hdel(Hdel),
    Hexists(Hexists),
    Hget(Hget),
    Hgetall(Hgetall),
    Hkeys(Hkeys),
    Hlen(Hlen),
    Hmset(Hmset),
    Hset(Hset),
    Hvals(Hvals),

    Echo(Echo),
    Ping(Ping),
}

/// Runs one decoded command against the store and returns the reply to send back.
///
/// Every failure, from an unknown command to a key of the wrong type, becomes an error reply,
/// so each command gets exactly one reply and the store is only touched by well-formed commands.
pub fn execute(frame: Frame, store: Store) -> Frame {
    match Command::try_from(frame).and_then(|cmd| cmd.exec(store)) {
        Ok(reply) => reply,
        Err(err) => {
            debug!(%err, "command failed");
            Frame::Error(err.to_string())
        }
    }
}

impl Executable for Command {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        match self {
            Command::DBsize(cmd) => cmd.exec(store),
            Command::Del(cmd) => cmd.exec(store),
            Command::Echo(cmd) => cmd.exec(store),
            Command::Exists(cmd) => cmd.exec(store),
            Command::Expire(cmd) => cmd.exec(store),
            Command::FlushAll(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Hdel(cmd) => cmd.exec(store),
            Command::Hexists(cmd) => cmd.exec(store),
            Command::Hget(cmd) => cmd.exec(store),
            Command::Hgetall(cmd) => cmd.exec(store),
            Command::Hkeys(cmd) => cmd.exec(store),
            Command::Hlen(cmd) => cmd.exec(store),
            Command::Hmset(cmd) => cmd.exec(store),
            Command::Hset(cmd) => cmd.exec(store),
            Command::Hvals(cmd) => cmd.exec(store),
            Command::Keys(cmd) => cmd.exec(store),
            Command::Lindex(cmd) => cmd.exec(store),
            Command::Llen(cmd) => cmd.exec(store),
            Command::Lpop(cmd) => cmd.exec(store),
            Command::Lpush(cmd) => cmd.exec(store),
            Command::Lrange(cmd) => cmd.exec(store),
            Command::Lrem(cmd) => cmd.exec(store),
            Command::Lset(cmd) => cmd.exec(store),
            Command::Persist(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Rename(cmd) => cmd.exec(store),
            Command::Rpop(cmd) => cmd.exec(store),
            Command::Rpush(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
            Command::Ttl(cmd) => cmd.exec(store),
            Command::Type(cmd) => cmd.exec(store),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                }
                .into())
            }
        };

        let mut parts = frames.into_iter();
        let command_name = parse_command_name(parts.next())?;

        let parser = &mut CommandParser {
            command: command_name.to_lowercase(),
            parts,
        };

        let command = match &command_name[..] {
            "DBSIZE" => DBSize::try_from(&mut *parser).map(Command::DBsize),
            "DEL" => Del::try_from(&mut *parser).map(Command::Del),
            "ECHO" => Echo::try_from(&mut *parser).map(Command::Echo),
            "EXISTS" => Exists::try_from(&mut *parser).map(Command::Exists),
            "EXPIRE" => Expire::try_from(&mut *parser).map(Command::Expire),
            "FLUSHALL" => FlushAll::try_from(&mut *parser).map(Command::FlushAll),
            "GET" => Get::try_from(&mut *parser).map(Command::Get),
            "HDEL" => Hdel::try_from(&mut *parser).map(Command::Hdel),
            "HEXISTS" => Hexists::try_from(&mut *parser).map(Command::Hexists),
            "HGET" => Hget::try_from(&mut *parser).map(Command::Hget),
            "HGETALL" => Hgetall::try_from(&mut *parser).map(Command::Hgetall),
            "HKEYS" => Hkeys::try_from(&mut *parser).map(Command::Hkeys),
            "HLEN" => Hlen::try_from(&mut *parser).map(Command::Hlen),
            "HMSET" => Hmset::try_from(&mut *parser).map(Command::Hmset),
            "HSET" => Hset::try_from(&mut *parser).map(Command::Hset),
            "HVALS" => Hvals::try_from(&mut *parser).map(Command::Hvals),
            "KEYS" => Keys::try_from(&mut *parser).map(Command::Keys),
            "LINDEX" => Lindex::try_from(&mut *parser).map(Command::Lindex),
            "LLEN" => Llen::try_from(&mut *parser).map(Command::Llen),
            "LPOP" => Lpop::try_from(&mut *parser).map(Command::Lpop),
            "LPUSH" => Lpush::try_from(&mut *parser).map(Command::Lpush),
            "LRANGE" => Lrange::try_from(&mut *parser).map(Command::Lrange),
            "LREM" => Lrem::try_from(&mut *parser).map(Command::Lrem),
            "LSET" => Lset::try_from(&mut *parser).map(Command::Lset),
            "PERSIST" => Persist::try_from(&mut *parser).map(Command::Persist),
            "PING" => Ping::try_from(&mut *parser).map(Command::Ping),
            "RENAME" => Rename::try_from(&mut *parser).map(Command::Rename),
            "RPOP" => Rpop::try_from(&mut *parser).map(Command::Rpop),
            "RPUSH" => Rpush::try_from(&mut *parser).map(Command::Rpush),
            "SET" => Set::try_from(&mut *parser).map(Command::Set),
            "TTL" => Ttl::try_from(&mut *parser).map(Command::Ttl),
            "TYPE" => Type::try_from(&mut *parser).map(Command::Type),
            _ => {
                return Err(CommandParserError::UnknownCommand {
                    command: parser.command.clone(),
                }
                .into())
            }
        };

        // Running out of arguments while parsing means too few were given.
        let command = command.map_err(|err| match err {
            CommandParserError::EndOfStream => parser.wrong_arity(),
            err => err,
        })?;
        parser.finish()?;

        Ok(command)
    }
}

fn parse_command_name(frame: Option<Frame>) -> Result<String, CommandParserError> {
    let command_name = frame.ok_or(CommandParserError::EmptyCommand)?;

    match command_name {
        Frame::Simple(s) => Ok(s.to_uppercase()),
        Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
            .map(|s| s.to_uppercase())
            .map_err(CommandParserError::InvalidUTF8String),
        frame => Err(CommandParserError::InvalidFrame {
            expected: "simple or bulk string".to_string(),
            actual: frame,
        }),
    }
}

pub struct CommandParser {
    /// Lowercase command name, as used in error messages.
    command: String,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn next_frame(&mut self) -> Result<Frame, CommandParserError> {
        self.parts.next().ok_or(CommandParserError::EndOfStream)
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        match self.next_frame()? {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        match self.next_frame()? {
            Frame::Integer(i) => Ok(i),
            Frame::Simple(string) => string
                .parse::<i64>()
                .map_err(|_| CommandParserError::InvalidInteger),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map_err(|_| CommandParserError::InvalidInteger)?
                .parse::<i64>()
                .map_err(|_| CommandParserError::InvalidInteger),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "integer".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        match self.next_frame()? {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Collects the remaining arguments as strings, requiring at least one.
    fn remaining_strings(&mut self) -> Result<Vec<String>, CommandParserError> {
        let mut strings = vec![self.next_string()?];
        while self.has_remaining() {
            strings.push(self.next_string()?);
        }
        Ok(strings)
    }

    fn has_remaining(&self) -> bool {
        self.parts.len() > 0
    }

    fn finish(&mut self) -> Result<(), CommandParserError> {
        if self.has_remaining() {
            return Err(self.wrong_arity());
        }
        Ok(())
    }

    fn wrong_arity(&self) -> CommandParserError {
        CommandParserError::WrongArity {
            command: self.command.clone(),
        }
    }
}

/// Errors found while turning a frame into a command. The messages are sent to clients as
/// error replies.
#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR Protocol error: expected {expected}, got {actual:?}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity { command: String },
    #[error("ERR value is not an integer or out of range")]
    InvalidInteger,
    #[error("ERR Protocol error: invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("ERR empty command")]
    EmptyCommand,
    #[error("ERR Protocol error: attempting to extract a value failed due to the frame being fully consumed")]
    EndOfStream,
}
