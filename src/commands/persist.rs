use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Remove the existing timeout on `key`. Replies with `1` if a timeout was removed.
///
/// Ref: <https://redis.io/docs/latest/commands/persist/>
#[derive(Debug, PartialEq)]
pub struct Persist {
    pub key: String,
}

impl Executable for Persist {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let removed = store.lock().persist(&self.key);
        Ok(Frame::Integer(removed as i64))
    }
}

impl TryFrom<&mut CommandParser> for Persist {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
