use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the elements of the list stored at `key` between `start` and `stop`, both inclusive.
/// Out of range indexes are clamped rather than reported.
///
/// Ref: <https://redis.io/docs/latest/commands/lrange/>
#[derive(Debug, PartialEq)]
pub struct Lrange {
    pub key: String,
    pub start: i64,
    pub stop: i64,
}

impl Executable for Lrange {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let values = store.lock().lrange(&self.key, self.start, self.stop)?;
        Ok(Frame::Array(values.into_iter().map(Frame::Bulk).collect()))
    }
}

impl TryFrom<&mut CommandParser> for Lrange {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let start = parser.next_integer()?;
        let stop = parser.next_integer()?;

        Ok(Self { key, start, stop })
    }
}
