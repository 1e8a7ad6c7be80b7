use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the remaining time to live of a key that has a timeout, in seconds.
///
/// Replies with `-2` if the key does not exist and `-1` if the key exists but has no
/// associated expiration.
///
/// Ref: <https://redis.io/docs/latest/commands/ttl/>
#[derive(Debug, PartialEq)]
pub struct Ttl {
    pub key: String,
}

impl Executable for Ttl {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let ttl = store.lock().ttl(&self.key);
        Ok(Frame::Integer(ttl))
    }
}

impl TryFrom<&mut CommandParser> for Ttl {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
