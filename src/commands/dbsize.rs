use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Return the number of keys in the database.
///
/// Ref: <https://redis.io/docs/latest/commands/dbsize/>
#[derive(Debug, PartialEq)]
pub struct DBSize;

impl Executable for DBSize {
    fn exec(self, store: Store) -> Result<Frame, Error> {
        let size = store.lock().size();
        Ok(Frame::Integer(size as i64))
    }
}

impl TryFrom<&mut CommandParser> for DBSize {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use bytes::Bytes;

    #[test]
    fn counts_keys_of_every_type() {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("DBSIZE"))]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(cmd, Command::DBsize(DBSize));

        let store = Store::new();
        {
            let mut store = store.lock();
            store.set(String::from("key1"), Bytes::from("1"));
            store.rpush("key2", Bytes::from("2")).unwrap();
            store
                .hset("key3", String::from("f"), Bytes::from("3"))
                .unwrap();
        }

        let res = cmd.exec(store.clone()).unwrap();

        assert_eq!(res, Frame::Integer(3));
    }
}
