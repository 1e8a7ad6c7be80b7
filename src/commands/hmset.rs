use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::hset::parse_pairs;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Sets the specified fields to their respective values in the hash stored at `key`.
///
/// Ref: <https://redis.io/docs/latest/commands/hmset/>
#[derive(Debug, PartialEq)]
pub struct Hmset {
    pub key: String,
    pub pairs: Vec<(String, Bytes)>,
}

impl Executable for Hmset {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        store.lock().hmset(&self.key, self.pairs)?;
        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Hmset {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let pairs = parse_pairs(parser)?;

        Ok(Self { key, pairs })
    }
}
