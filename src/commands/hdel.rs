use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Removes the specified fields from the hash stored at `key`. Removing the last field deletes
/// the key. Replies with the number of fields that were removed.
///
/// Ref: <https://redis.io/docs/latest/commands/hdel/>
#[derive(Debug, PartialEq)]
pub struct Hdel {
    pub key: String,
    pub fields: Vec<String>,
}

impl Executable for Hdel {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let mut store = store.lock();
        let mut removed = 0;
        for field in &self.fields {
            if store.hdel(&self.key, field)? {
                removed += 1;
            }
        }

        Ok(Frame::Integer(removed))
    }
}

impl TryFrom<&mut CommandParser> for Hdel {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let fields = parser.remaining_strings()?;

        Ok(Self { key, fields })
    }
}
