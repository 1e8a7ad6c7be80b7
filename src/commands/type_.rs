use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the string representation of the type of the value stored at `key`: `string`,
/// `list`, `hash` or `none` when the key does not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/type/>
#[derive(Debug, PartialEq)]
pub struct Type {
    pub key: String,
}

impl Executable for Type {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let value_type = store.lock().value_type(&self.key);
        Ok(Frame::Simple(value_type.to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Type {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
