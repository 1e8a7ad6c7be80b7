use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Sets the specified fields to their respective values in the hash stored at `key`, creating
/// the hash if needed. Replies with the number of fields that were added.
///
/// Ref: <https://redis.io/docs/latest/commands/hset/>
#[derive(Debug, PartialEq)]
pub struct Hset {
    pub key: String,
    pub pairs: Vec<(String, Bytes)>,
}

impl Executable for Hset {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let mut store = store.lock();
        let mut added = 0;
        for (field, value) in self.pairs {
            if store.hset(&self.key, field, value)? {
                added += 1;
            }
        }

        Ok(Frame::Integer(added))
    }
}

impl TryFrom<&mut CommandParser> for Hset {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let pairs = parse_pairs(parser)?;

        Ok(Self { key, pairs })
    }
}

/// Reads `field value [field value ...]`. A field without a value reads as a missing argument.
pub(crate) fn parse_pairs(
    parser: &mut CommandParser,
) -> Result<Vec<(String, Bytes)>, CommandParserError> {
    let mut pairs = vec![];
    loop {
        let field = parser.next_string()?;
        let value = parser.next_bytes()?;
        pairs.push((field, value));

        if !parser.has_remaining() {
            return Ok(pairs);
        }
    }
}
