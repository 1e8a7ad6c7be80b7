use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Replies with `1` if `field` exists in the hash stored at `key`, `0` otherwise.
///
/// Ref: <https://redis.io/docs/latest/commands/hexists/>
#[derive(Debug, PartialEq)]
pub struct Hexists {
    pub key: String,
    pub field: String,
}

impl Executable for Hexists {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let exists = store.lock().hexists(&self.key, &self.field)?;
        Ok(Frame::Integer(exists as i64))
    }
}

impl TryFrom<&mut CommandParser> for Hexists {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let field = parser.next_string()?;

        Ok(Self { key, field })
    }
}
