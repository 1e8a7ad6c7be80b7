use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::{Store, StoreError};
use crate::Error;

/// Renames `key` to `newkey`, carrying its value and timeout. An existing `newkey` is
/// overwritten. Returns an error when `key` does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/rename/>
#[derive(Debug, PartialEq)]
pub struct Rename {
    pub key: String,
    pub new_key: String,
}

impl Executable for Rename {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        if !store.lock().rename(&self.key, &self.new_key) {
            return Err(StoreError::NoSuchKey.into());
        }

        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Rename {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let new_key = parser.next_string()?;

        Ok(Self { key, new_key })
    }
}
