use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Set a timeout on `key`, in seconds. After the timeout has expired the key is deleted. A
/// timeout that is zero or negative deletes the key immediately.
///
/// Replies with `1` if the timeout was set and `0` if the key does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/expire/>
#[derive(Debug, PartialEq)]
pub struct Expire {
    pub key: String,
    pub seconds: i64,
}

impl Executable for Expire {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let set = store.lock().expire(&self.key, self.seconds)?;
        Ok(Frame::Integer(set as i64))
    }
}

impl TryFrom<&mut CommandParser> for Expire {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let seconds = parser.next_integer()?;

        Ok(Self { key, seconds })
    }
}
