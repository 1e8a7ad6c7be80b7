use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Insert all the specified values at the head of the list stored at `key`, one after the other,
/// so the last value ends up first. The list is created if `key` does not exist. Replies with the
/// length of the list after the push.
///
/// Ref: <https://redis.io/docs/latest/commands/lpush/>
#[derive(Debug, PartialEq)]
pub struct Lpush {
    pub key: String,
    pub values: Vec<Bytes>,
}

impl Executable for Lpush {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let mut store = store.lock();
        let mut len = 0;
        for value in self.values {
            len = store.lpush(&self.key, value)?;
        }

        Ok(Frame::Integer(len as i64))
    }
}

impl TryFrom<&mut CommandParser> for Lpush {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        let mut values = vec![parser.next_bytes()?];
        while parser.has_remaining() {
            values.push(parser.next_bytes()?);
        }

        Ok(Self { key, values })
    }
}
