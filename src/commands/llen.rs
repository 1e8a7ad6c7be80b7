use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the length of the list stored at `key`, `0` if the key does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/llen/>
#[derive(Debug, PartialEq)]
pub struct Llen {
    pub key: String,
}

impl Executable for Llen {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let len = store.lock().llen(&self.key)?;
        Ok(Frame::Integer(len as i64))
    }
}

impl TryFrom<&mut CommandParser> for Llen {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
