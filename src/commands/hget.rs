use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the value associated with `field` in the hash stored at `key`.
///
/// Ref: <https://redis.io/docs/latest/commands/hget/>
#[derive(Debug, PartialEq)]
pub struct Hget {
    pub key: String,
    pub field: String,
}

impl Executable for Hget {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let value = store.lock().hget(&self.key, &self.field)?;

        match value {
            Some(value) => Ok(Frame::Bulk(value)),
            None => Ok(Frame::NullBulkString),
        }
    }
}

impl TryFrom<&mut CommandParser> for Hget {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let field = parser.next_string()?;

        Ok(Self { key, field })
    }
}
