use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Sets the list element at `index` to `value`. Indices follow the same rules as `LINDEX`.
///
/// An error is returned for out of range indexes and for keys that do not exist.
///
/// Ref: <https://redis.io/docs/latest/commands/lset/>
#[derive(Debug, PartialEq)]
pub struct Lset {
    pub key: String,
    pub index: i64,
    pub value: Bytes,
}

impl Executable for Lset {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        store.lock().lset(&self.key, self.index, self.value)?;
        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Lset {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let index = parser.next_integer()?;
        let value = parser.next_bytes()?;

        Ok(Self { key, index, value })
    }
}
