use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Delete all the keys.
///
/// Ref: <https://redis.io/docs/latest/commands/flushall/>
#[derive(Debug, PartialEq)]
pub struct FlushAll;

impl Executable for FlushAll {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        store.lock().flush_all();
        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for FlushAll {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}
