use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns all values in the hash stored at `key`.
///
/// Ref: <https://redis.io/docs/latest/commands/hvals/>
#[derive(Debug, PartialEq)]
pub struct Hvals {
    pub key: String,
}

impl Executable for Hvals {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let values = store.lock().hvals(&self.key)?;
        Ok(Frame::Array(values.into_iter().map(Frame::Bulk).collect()))
    }
}

impl TryFrom<&mut CommandParser> for Hvals {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
