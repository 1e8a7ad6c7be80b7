use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes occurrences of `value` from the list stored at `key`.
///
/// A positive `count` removes up to `count` matches moving from head to tail, a negative one
/// moves from tail to head, and `0` removes every match. Replies with the number of removed
/// elements.
///
/// Ref: <https://redis.io/docs/latest/commands/lrem/>
#[derive(Debug, PartialEq)]
pub struct Lrem {
    pub key: String,
    pub count: i64,
    pub value: Bytes,
}

impl Executable for Lrem {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let removed = store.lock().lrem(&self.key, self.count, &self.value)?;
        Ok(Frame::Integer(removed as i64))
    }
}

impl TryFrom<&mut CommandParser> for Lrem {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let count = parser.next_integer()?;
        let value = parser.next_bytes()?;

        Ok(Self { key, count, value })
    }
}
