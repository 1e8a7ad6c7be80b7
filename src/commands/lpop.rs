use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes and returns the first element of the list stored at `key`. Replies with `nil` when the
/// key does not exist. Popping the last element deletes the key.
///
/// Ref: <https://redis.io/docs/latest/commands/lpop/>
#[derive(Debug, PartialEq)]
pub struct Lpop {
    pub key: String,
}

impl Executable for Lpop {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let value = store.lock().lpop(&self.key)?;

        match value {
            Some(value) => Ok(Frame::Bulk(value)),
            None => Ok(Frame::NullBulkString),
        }
    }
}

impl TryFrom<&mut CommandParser> for Lpop {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
