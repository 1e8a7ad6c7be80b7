use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the number of fields in the hash stored at `key`.
///
/// Ref: <https://redis.io/docs/latest/commands/hlen/>
#[derive(Debug, PartialEq)]
pub struct Hlen {
    pub key: String,
}

impl Executable for Hlen {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let len = store.lock().hlen(&self.key)?;
        Ok(Frame::Integer(len as i64))
    }
}

impl TryFrom<&mut CommandParser> for Hlen {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
