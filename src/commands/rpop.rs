use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes and returns the last element of the list stored at `key`. Replies with `nil` when the
/// key does not exist. Popping the last element deletes the key.
///
/// Ref: <https://redis.io/docs/latest/commands/rpop/>
#[derive(Debug, PartialEq)]
pub struct Rpop {
    pub key: String,
}

impl Executable for Rpop {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let value = store.lock().rpop(&self.key)?;

        match value {
            Some(value) => Ok(Frame::Bulk(value)),
            None => Ok(Frame::NullBulkString),
        }
    }
}

impl TryFrom<&mut CommandParser> for Rpop {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
