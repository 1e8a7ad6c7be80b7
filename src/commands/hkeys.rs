use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns all field names in the hash stored at `key`.
///
/// Ref: <https://redis.io/docs/latest/commands/hkeys/>
#[derive(Debug, PartialEq)]
pub struct Hkeys {
    pub key: String,
}

impl Executable for Hkeys {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let fields = store.lock().hkeys(&self.key)?;
        let frames = fields
            .into_iter()
            .map(|field| Frame::Bulk(Bytes::from(field)))
            .collect();

        Ok(Frame::Array(frames))
    }
}

impl TryFrom<&mut CommandParser> for Hkeys {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
