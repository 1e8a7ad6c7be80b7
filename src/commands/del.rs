use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes the specified keys, whatever type of value they hold. A key is ignored if it does
/// not exist. Returns the number of keys that were removed.
///
/// Ref: <https://redis.io/commands/del>
#[derive(Debug, PartialEq)]
pub struct Del {
    pub keys: Vec<String>,
}

impl Executable for Del {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let mut store = store.lock();
        let count = self.keys.iter().filter(|key| store.del(key)).count();

        Ok(Frame::Integer(count as i64))
    }
}

impl TryFrom<&mut CommandParser> for Del {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let keys = parser.remaining_strings()?;
        Ok(Self { keys })
    }
}
