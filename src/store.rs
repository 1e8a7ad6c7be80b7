use bytes::Bytes;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strum_macros::Display;
use thiserror::Error as ThisError;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info};

/// The Store holds strings, lists and hashes under a single keyspace, with optional expiration
/// for each key. Expired keys are removed lazily when touched and, when the store is created
/// inside a Tokio runtime, by a background task as soon as their deadline passes.
///
/// Every operation runs under one mutex, so operations are atomic with respect to each other.
/// The store is cloned cheaply using reference counting.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        let inner = Arc::new(InnerStore {
            state: Mutex::new(State::default()),
            waker: Notify::new(),
        });

        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn({
                let inner = inner.clone();
                async move { remove_expired_keys(inner).await }
            });
        }

        Self { inner }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("ERR index out of range")]
    IndexOutOfRange,
    #[error("ERR invalid expire time in 'expire' command")]
    InvalidExpireTime,
}

#[derive(Debug, ThisError)]
pub enum DumpError {
    #[error("dump file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed dump file at line {line}: {reason}")]
    Malformed { line: usize, reason: &'static str },
}

/// The type of the value held by a key, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    String,
    List,
    Hash,
    None,
}

type Key = String;

#[derive(Default)]
struct State {
    strings: HashMap<Key, Bytes>,
    lists: HashMap<Key, VecDeque<Bytes>>,
    hashes: HashMap<Key, HashMap<String, Bytes>>,
    expirations: HashMap<Key, Instant>,
    ttls: BTreeSet<(Instant, Key)>,
}

impl State {
    fn value_type(&self, key: &str) -> ValueType {
        if self.strings.contains_key(key) {
            ValueType::String
        } else if self.lists.contains_key(key) {
            ValueType::List
        } else if self.hashes.contains_key(key) {
            ValueType::Hash
        } else {
            ValueType::None
        }
    }

    /// Removes `key` if its deadline has passed and reports the type of what is left.
    fn live_type(&mut self, key: &str) -> ValueType {
        let expired = self
            .expirations
            .get(key)
            .is_some_and(|expires_at| *expires_at <= Instant::now());

        if expired {
            debug!(key, "removing expired key");
            self.remove(key);
        }

        self.value_type(key)
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.strings.remove(key).is_some()
            | self.lists.remove(key).is_some()
            | self.hashes.remove(key).is_some();
        self.clear_expiration(key);
        removed
    }

    fn set_expiration(&mut self, key: &str, expires_at: Instant) {
        self.clear_expiration(key);
        self.expirations.insert(key.to_string(), expires_at);
        self.ttls.insert((expires_at, key.to_string()));
    }

    fn clear_expiration(&mut self, key: &str) -> Option<Instant> {
        let expires_at = self.expirations.remove(key)?;
        self.ttls.remove(&(expires_at, key.to_string()));
        Some(expires_at)
    }

    fn list(&mut self, key: &str) -> Result<Option<&mut VecDeque<Bytes>>, StoreError> {
        match self.live_type(key) {
            ValueType::List => Ok(self.lists.get_mut(key)),
            ValueType::None => Ok(None),
            _ => Err(StoreError::WrongType),
        }
    }

    fn list_or_default(&mut self, key: &str) -> Result<&mut VecDeque<Bytes>, StoreError> {
        match self.live_type(key) {
            ValueType::List | ValueType::None => {
                Ok(self.lists.entry(key.to_string()).or_default())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    fn hash(&mut self, key: &str) -> Result<Option<&mut HashMap<String, Bytes>>, StoreError> {
        match self.live_type(key) {
            ValueType::Hash => Ok(self.hashes.get_mut(key)),
            ValueType::None => Ok(None),
            _ => Err(StoreError::WrongType),
        }
    }

    fn hash_or_default(&mut self, key: &str) -> Result<&mut HashMap<String, Bytes>, StoreError> {
        match self.live_type(key) {
            ValueType::Hash | ValueType::None => {
                Ok(self.hashes.entry(key.to_string()).or_default())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    // Containers never stay around empty.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.value_type(key) {
            ValueType::List => self.lists.get(key).is_some_and(VecDeque::is_empty),
            ValueType::Hash => self.hashes.get(key).is_some_and(HashMap::is_empty),
            _ => false,
        };

        if empty {
            self.remove(key);
        }
    }

    fn remove_expired_keys(&mut self) -> Option<Instant> {
        let now = Instant::now();

        let expired_keys: Vec<(Instant, String)> = self
            .ttls
            .iter()
            .take_while(|(expires_at, _)| expires_at <= &now)
            .cloned()
            .collect();

        for (_, key) in expired_keys {
            debug!(%key, "removing expired key");
            self.remove(&key);
        }

        self.ttls.iter().next().map(|&(expires_at, _)| expires_at)
    }
}

pub struct InnerStore {
    state: Mutex<State>,
    waker: Notify,
}

pub struct InnerStoreLocked<'a> {
    state: MutexGuard<'a, State>,
    waker: &'a Notify,
}

impl InnerStore {
    pub fn lock(&self) -> InnerStoreLocked<'_> {
        InnerStoreLocked {
            state: self.lock_state(),
            waker: &self.waker,
        }
    }

    // The state is consistent between operations, so a poisoned lock is still usable.
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes every string, list and hash to `path`, one record per line. Expirations are not
    /// written. The store stays locked while the file is written so the snapshot is consistent.
    ///
    /// The records are written to a temporary file which then replaces `path`, so a failed dump
    /// never leaves a truncated file behind.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<(), DumpError> {
        let path = path.as_ref();
        let tmp = temp_path(path);

        let mut state = self.lock_state();
        state.remove_expired_keys();

        let mut out = BufWriter::new(fs::File::create(&tmp)?);
        for (key, value) in &state.strings {
            out.write_all(b"K")?;
            out.write_all(&escape(key.as_bytes()))?;
            out.write_all(b" ")?;
            out.write_all(&escape(value))?;
            out.write_all(b"\n")?;
        }

        for (key, items) in &state.lists {
            out.write_all(b"L")?;
            out.write_all(&escape(key.as_bytes()))?;
            for item in items {
                out.write_all(b" ")?;
                out.write_all(&escape(item))?;
            }
            out.write_all(b"\n")?;
        }

        for (key, fields) in &state.hashes {
            out.write_all(b"H ")?;
            out.write_all(&escape(key.as_bytes()))?;
            for (field, value) in fields {
                out.write_all(b" ")?;
                out.write_all(&escape(field.as_bytes()))?;
                out.write_all(b":")?;
                out.write_all(&escape(value))?;
            }
            out.write_all(b"\n")?;
        }

        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&tmp, path)?;

        info!(
            path = %path.display(),
            keys = state.strings.len() + state.lists.len() + state.hashes.len(),
            "dumped store"
        );
        Ok(())
    }

    /// Replaces the whole content of the store with the records in `path`.
    ///
    /// The file is parsed completely before anything is replaced: if it cannot be read or is
    /// malformed, the store is left untouched.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), DumpError> {
        let path = path.as_ref();
        let contents = fs::read(path)?;
        let loaded = parse_dump(&contents)?;

        let keys = loaded.strings.len() + loaded.lists.len() + loaded.hashes.len();
        *self.lock_state() = loaded;
        // Wake the reaper so it drops deadlines that no longer exist.
        self.waker.notify_one();

        info!(path = %path.display(), keys, "loaded store");
        Ok(())
    }
}

impl<'a> InnerStoreLocked<'a> {
    /// Sets `key` to hold a string, replacing any value of any type and discarding its TTL.
    pub fn set(&mut self, key: String, data: Bytes) {
        self.state.remove(&key);
        self.state.strings.insert(key, data);
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.state.live_type(key) {
            ValueType::String => Ok(self.state.strings.get(key).cloned()),
            ValueType::None => Ok(None),
            _ => Err(StoreError::WrongType),
        }
    }

    /// Removes `key` whatever its type. Returns whether it existed.
    pub fn del(&mut self, key: &str) -> bool {
        match self.state.live_type(key) {
            ValueType::None => false,
            _ => self.state.remove(key),
        }
    }

    pub fn exists(&mut self, key: &str) -> bool {
        self.state.live_type(key) != ValueType::None
    }

    pub fn value_type(&mut self, key: &str) -> ValueType {
        self.state.live_type(key)
    }

    /// All live keys across strings, lists and hashes, in no particular order.
    pub fn keys(&mut self) -> Vec<String> {
        self.state.remove_expired_keys();

        self.state
            .strings
            .keys()
            .chain(self.state.lists.keys())
            .chain(self.state.hashes.keys())
            .cloned()
            .collect()
    }

    pub fn size(&mut self) -> usize {
        self.state.remove_expired_keys();
        self.state.strings.len() + self.state.lists.len() + self.state.hashes.len()
    }

    /// Sets `key` to expire `seconds` from now. A deadline that is not in the future deletes the
    /// key right away. Returns `false` if the key does not exist, and an error if the deadline
    /// cannot be represented.
    pub fn expire(&mut self, key: &str, seconds: i64) -> Result<bool, StoreError> {
        if self.state.live_type(key) == ValueType::None {
            return Ok(false);
        }

        if seconds <= 0 {
            self.state.remove(key);
            return Ok(true);
        }

        let expires_at = Instant::now()
            .checked_add(Duration::from_secs(seconds.unsigned_abs()))
            .ok_or(StoreError::InvalidExpireTime)?;
        self.state.set_expiration(key, expires_at);

        let next_to_expire = self.state.ttls.iter().next().map(|(_, key)| key);
        let expires_next = next_to_expire.is_some_and(|next| next == key);
        if expires_next {
            self.waker.notify_one();
        }

        Ok(true)
    }

    /// Removes the expiration of `key`. Returns whether there was one.
    pub fn persist(&mut self, key: &str) -> bool {
        if self.state.live_type(key) == ValueType::None {
            return false;
        }
        self.state.clear_expiration(key).is_some()
    }

    /// Remaining time to live in seconds: `-2` if the key does not exist, `-1` if it has no
    /// expiration.
    pub fn ttl(&mut self, key: &str) -> i64 {
        if self.state.live_type(key) == ValueType::None {
            return -2;
        }

        match self.state.expirations.get(key) {
            Some(expires_at) => {
                let remaining = expires_at.saturating_duration_since(Instant::now());
                ((remaining.as_millis() + 500) / 1000) as i64
            }
            None => -1,
        }
    }

    /// Moves the value of `old` and its expiration to `new`, replacing whatever `new` held.
    /// Returns `false` if `old` does not exist.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if self.state.live_type(old) == ValueType::None {
            return false;
        }

        if old == new {
            return true;
        }

        let expires_at = self.state.clear_expiration(old);
        self.state.remove(new);

        if let Some(value) = self.state.strings.remove(old) {
            self.state.strings.insert(new.to_string(), value);
        } else if let Some(items) = self.state.lists.remove(old) {
            self.state.lists.insert(new.to_string(), items);
        } else if let Some(fields) = self.state.hashes.remove(old) {
            self.state.hashes.insert(new.to_string(), fields);
        }

        if let Some(expires_at) = expires_at {
            self.state.set_expiration(new, expires_at);
        }

        true
    }

    pub fn flush_all(&mut self) {
        *self.state = State::default();
    }

    /// Inserts `value` at the head of the list, creating it if needed. Returns the new length.
    pub fn lpush(&mut self, key: &str, value: Bytes) -> Result<usize, StoreError> {
        let list = self.state.list_or_default(key)?;
        list.push_front(value);
        Ok(list.len())
    }

    /// Inserts `value` at the tail of the list, creating it if needed. Returns the new length.
    pub fn rpush(&mut self, key: &str, value: Bytes) -> Result<usize, StoreError> {
        let list = self.state.list_or_default(key)?;
        list.push_back(value);
        Ok(list.len())
    }

    pub fn lpop(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let value = self.state.list(key)?.and_then(VecDeque::pop_front);
        self.state.drop_if_empty(key);
        Ok(value)
    }

    pub fn rpop(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let value = self.state.list(key)?.and_then(VecDeque::pop_back);
        self.state.drop_if_empty(key);
        Ok(value)
    }

    pub fn llen(&mut self, key: &str) -> Result<usize, StoreError> {
        Ok(self.state.list(key)?.map_or(0, |list| list.len()))
    }

    /// Element at `index`; negative indices count from the tail, `-1` being the last element.
    pub fn lindex(&mut self, key: &str, index: i64) -> Result<Option<Bytes>, StoreError> {
        let value = self.state.list(key)?.and_then(|list| {
            resolve_index(list.len(), index).and_then(|index| list.get(index).cloned())
        });
        Ok(value)
    }

    pub fn lset(&mut self, key: &str, index: i64, value: Bytes) -> Result<(), StoreError> {
        let list = self.state.list(key)?.ok_or(StoreError::NoSuchKey)?;
        let index = resolve_index(list.len(), index).ok_or(StoreError::IndexOutOfRange)?;
        list[index] = value;
        Ok(())
    }

    /// Removes occurrences of `value`: all of them if `count` is zero, the first `count` from
    /// the head if positive, the last `|count|` from the tail if negative. Returns how many were
    /// removed.
    pub fn lrem(&mut self, key: &str, count: i64, value: &[u8]) -> Result<usize, StoreError> {
        let Some(list) = self.state.list(key)? else {
            return Ok(0);
        };

        let limit = if count == 0 {
            usize::MAX
        } else {
            usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX)
        };
        let mut removed = 0;

        if count >= 0 {
            list.retain(|item| {
                let matches = removed < limit && item.as_ref() == value;
                if matches {
                    removed += 1;
                }
                !matches
            });
        } else {
            let mut index = list.len();
            while index > 0 && removed < limit {
                index -= 1;
                if list[index].as_ref() == value {
                    list.remove(index);
                    removed += 1;
                }
            }
        }

        self.state.drop_if_empty(key);
        Ok(removed)
    }

    /// Elements between `start` and `stop`, both inclusive and both accepting negative indices.
    /// Out of range bounds are clamped.
    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>, StoreError> {
        let Some(list) = self.state.list(key)? else {
            return Ok(vec![]);
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

        if start > stop || start >= len {
            return Ok(vec![]);
        }

        Ok(list
            .range(start as usize..=stop as usize)
            .cloned()
            .collect())
    }

    /// Sets `field` in the hash, creating it if needed. Returns whether the field is new.
    pub fn hset(&mut self, key: &str, field: String, value: Bytes) -> Result<bool, StoreError> {
        let hash = self.state.hash_or_default(key)?;
        Ok(hash.insert(field, value).is_none())
    }

    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .state
            .hash(key)?
            .and_then(|hash| hash.get(field).cloned()))
    }

    pub fn hexists(&mut self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .hash(key)?
            .is_some_and(|hash| hash.contains_key(field)))
    }

    pub fn hdel(&mut self, key: &str, field: &str) -> Result<bool, StoreError> {
        let removed = self
            .state
            .hash(key)?
            .is_some_and(|hash| hash.remove(field).is_some());
        self.state.drop_if_empty(key);
        Ok(removed)
    }

    pub fn hgetall(&mut self, key: &str) -> Result<HashMap<String, Bytes>, StoreError> {
        Ok(self.state.hash(key)?.cloned().unwrap_or_default())
    }

    pub fn hkeys(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .hash(key)?
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default())
    }

    pub fn hvals(&mut self, key: &str) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .state
            .hash(key)?
            .map(|hash| hash.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn hlen(&mut self, key: &str) -> Result<usize, StoreError> {
        Ok(self.state.hash(key)?.map_or(0, |hash| hash.len()))
    }

    /// Sets every `(field, value)` pair in the hash.
    pub fn hmset(&mut self, key: &str, pairs: Vec<(String, Bytes)>) -> Result<(), StoreError> {
        let hash = self.state.hash_or_default(key)?;
        hash.extend(pairs);
        self.state.drop_if_empty(key);
        Ok(())
    }

    pub fn remove_expired_keys(&mut self) -> Option<Instant> {
        self.state.remove_expired_keys()
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

async fn remove_expired_keys(store: Arc<InnerStore>) {
    loop {
        let next_expiration = store.lock().remove_expired_keys();

        if let Some(next_expiration) = next_expiration {
            tokio::select! {
                _ = sleep_until(next_expiration) => {}
                _ = store.waker.notified() => {}
            }
        } else {
            store.waker.notified().await;
        }
    }
}

// Dump records are separated by single spaces and newlines, so those bytes, the hash
// field/value separator and the escape byte itself are escaped inside every token.
fn escape(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    for &byte in src {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b' ' => out.extend_from_slice(b"\\s"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b':' => out.extend_from_slice(b"\\c"),
            byte => out.push(byte),
        }
    }
    out
}

fn unescape(src: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(src.len());
    let mut bytes = src.iter();
    while let Some(&byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }

        let unescaped = match bytes.next()? {
            b'\\' => b'\\',
            b's' => b' ',
            b'n' => b'\n',
            b'r' => b'\r',
            b'c' => b':',
            _ => return None,
        };
        out.push(unescaped);
    }
    Some(out)
}

fn parse_dump(contents: &[u8]) -> Result<State, DumpError> {
    let mut state = State::default();

    for (index, line) in contents.split(|&b| b == b'\n').enumerate() {
        let line_number = index + 1;
        let malformed = |reason| DumpError::Malformed {
            line: line_number,
            reason,
        };

        let Some((&marker, rest)) = line.split_first() else {
            continue;
        };

        let (key, values) = match marker {
            b'K' | b'L' => split_key(rest),
            b'H' => match rest.split_first() {
                Some((b' ', rest)) => split_key(rest),
                _ => return Err(malformed("hash record must start with \"H \"")),
            },
            _ => return Err(malformed("unknown record type")),
        };

        let key = unescape(key)
            .and_then(|key| String::from_utf8(key).ok())
            .ok_or_else(|| malformed("invalid key"))?;
        let mut tokens = values.map(|values| values.split(|&b| b == b' '));

        // A key appears once in the store, the last record for it wins.
        state.remove(&key);

        match marker {
            b'K' => {
                let value = tokens
                    .and_then(|mut tokens| tokens.next())
                    .ok_or_else(|| malformed("string record without a value"))?;
                let value = unescape(value).ok_or_else(|| malformed("invalid value"))?;
                state.strings.insert(key, Bytes::from(value));
            }
            b'L' => {
                let mut list = VecDeque::new();
                for item in tokens.iter_mut().flatten() {
                    let item = unescape(item).ok_or_else(|| malformed("invalid list item"))?;
                    list.push_back(Bytes::from(item));
                }
                if !list.is_empty() {
                    state.lists.insert(key, list);
                }
            }
            _ => {
                let mut hash = HashMap::new();
                for pair in tokens.iter_mut().flatten() {
                    let separator = pair
                        .iter()
                        .position(|&b| b == b':')
                        .ok_or_else(|| malformed("hash field without a value"))?;
                    let field = unescape(&pair[..separator])
                        .and_then(|field| String::from_utf8(field).ok())
                        .ok_or_else(|| malformed("invalid hash field"))?;
                    let value = unescape(&pair[separator + 1..])
                        .ok_or_else(|| malformed("invalid hash value"))?;
                    hash.insert(field, Bytes::from(value));
                }
                if !hash.is_empty() {
                    state.hashes.insert(key, hash);
                }
            }
        }
    }

    Ok(state)
}

// `dump.db` -> `dump.db.tmp`, next to the target so the final rename stays on one filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// `key rest...` -> (key, Some(rest)), or (key, None) when nothing follows the key.
fn split_key(record: &[u8]) -> (&[u8], Option<&[u8]>) {
    match record.iter().position(|&b| b == b' ') {
        Some(space) => (&record[..space], Some(&record[space + 1..])),
        None => (record, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::thread;
    use tokio::time;

    fn list(store: &Store, key: &str) -> Vec<Bytes> {
        store.lock().lrange(key, 0, -1).unwrap()
    }

    fn push_all(store: &Store, key: &str, items: &[&'static str]) {
        let mut store = store.lock();
        for item in items {
            store.rpush(key, Bytes::from(*item)).unwrap();
        }
    }

    #[tokio::test]
    async fn ttl() {
        time::pause();

        let store = Store::new();

        {
            let mut store = store.lock();

            store.set("key1".to_string(), Bytes::from("value1"));
            store.set("key2".to_string(), Bytes::from("value2"));
            store.rpush("key3", Bytes::from("value3")).unwrap();

            assert!(store.expire("key1", 10).unwrap());
            assert!(store.expire("key2", 20).unwrap());
            assert!(store.expire("key3", 20).unwrap());
        }

        assert_eq!(store.lock().size(), 3);

        time::advance(Duration::from_secs(10)).await;
        time::sleep(Duration::from_millis(1)).await;

        // The background task removed the key without anyone touching it.
        assert_eq!(store.lock_state().strings.len(), 1);
        assert!(store.lock().exists("key2"));

        time::advance(Duration::from_secs(20)).await;
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.lock_state().strings.len(), 0);
        assert_eq!(store.lock_state().lists.len(), 0);

        {
            let mut store = store.lock();

            store.set("key4".to_string(), Bytes::from("value4"));
            store.expire("key4", 20).unwrap();
        }

        assert_eq!(store.lock().size(), 1);

        time::advance(Duration::from_secs(20)).await;
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.lock_state().strings.len(), 0);
    }

    #[test]
    fn expired_key_is_gone_on_next_access() {
        let store = Store::new();
        let mut locked = store.lock();

        locked.set("key".to_string(), Bytes::from("value"));
        let past = Instant::now() - Duration::from_secs(1);
        locked.state.set_expiration("key", past);

        assert_eq!(locked.get("key"), Ok(None));
        assert_eq!(locked.value_type("key"), ValueType::None);
        assert!(locked.state.expirations.is_empty());
        assert!(locked.state.ttls.is_empty());
    }

    #[test]
    fn expire_missing_key() {
        let store = Store::new();

        assert!(!store.lock().expire("missing", 10).unwrap());
        assert_eq!(store.lock().ttl("missing"), -2);
    }

    #[test]
    fn expire_beyond_the_clock_range() {
        let store = Store::new();
        let mut store = store.lock();

        store.set("key".to_string(), Bytes::from("value"));
        store.expire("key", 100).unwrap();

        assert_eq!(
            store.expire("key", i64::MAX),
            Err(StoreError::InvalidExpireTime)
        );
        assert_eq!(store.ttl("key"), 100);
        assert_eq!(store.get("key"), Ok(Some(Bytes::from("value"))));

        assert_eq!(store.expire("missing", i64::MAX), Ok(false));
        assert!(store.expire("key", i64::MIN).unwrap());
        assert!(!store.exists("key"));
    }

    #[test]
    fn expire_in_the_past_deletes() {
        let store = Store::new();
        let mut store = store.lock();

        store.set("key".to_string(), Bytes::from("value"));

        assert!(store.expire("key", 0).unwrap());
        assert!(!store.exists("key"));
    }

    #[test]
    fn set_discards_ttl() {
        let store = Store::new();
        let mut store = store.lock();

        store.set("key".to_string(), Bytes::from("value"));
        store.expire("key", 100).unwrap();
        assert_eq!(store.ttl("key"), 100);

        store.set("key".to_string(), Bytes::from("other"));
        assert_eq!(store.ttl("key"), -1);
    }

    #[test]
    fn persist_removes_ttl() {
        let store = Store::new();
        let mut store = store.lock();

        store.set("key".to_string(), Bytes::from("value"));
        assert!(!store.persist("key"));

        store.expire("key", 100).unwrap();
        assert!(store.persist("key"));
        assert_eq!(store.ttl("key"), -1);
    }

    #[test]
    fn type_exclusivity() {
        let store = Store::new();
        let mut store = store.lock();

        store.set("s".to_string(), Bytes::from("v"));
        store.rpush("l", Bytes::from("v")).unwrap();
        store.hset("h", "f".to_string(), Bytes::from("v")).unwrap();

        assert_eq!(store.value_type("s"), ValueType::String);
        assert_eq!(store.value_type("l"), ValueType::List);
        assert_eq!(store.value_type("h"), ValueType::Hash);
        assert_eq!(store.value_type("none"), ValueType::None);

        assert_eq!(store.lpush("s", Bytes::from("x")), Err(StoreError::WrongType));
        assert_eq!(store.llen("h"), Err(StoreError::WrongType));
        assert_eq!(store.lpop("h"), Err(StoreError::WrongType));
        assert_eq!(
            store.hset("l", "f".to_string(), Bytes::from("x")),
            Err(StoreError::WrongType)
        );
        assert_eq!(store.hgetall("s"), Err(StoreError::WrongType));
        assert_eq!(store.get("l"), Err(StoreError::WrongType));

        // The failed operations left every key as it was.
        assert_eq!(store.get("s"), Ok(Some(Bytes::from("v"))));
        assert_eq!(store.llen("l"), Ok(1));
        assert_eq!(store.hlen("h"), Ok(1));

        // SET replaces a value of any type.
        store.set("l".to_string(), Bytes::from("now a string"));
        assert_eq!(store.value_type("l"), ValueType::String);
        assert_eq!(store.size(), 3);
    }

    #[test]
    fn del_any_type() {
        let store = Store::new();
        let mut store = store.lock();

        store.rpush("l", Bytes::from("v")).unwrap();
        store.expire("l", 100).unwrap();

        assert!(store.del("l"));
        assert!(!store.del("l"));
        assert!(store.state.expirations.is_empty());
    }

    #[test]
    fn list_push_and_pop() {
        let store = Store::new();
        let mut store = store.lock();

        assert_eq!(store.lpush("l", Bytes::from("b")), Ok(1));
        assert_eq!(store.lpush("l", Bytes::from("a")), Ok(2));
        assert_eq!(store.rpush("l", Bytes::from("c")), Ok(3));

        assert_eq!(store.lpop("l"), Ok(Some(Bytes::from("a"))));
        assert_eq!(store.rpop("l"), Ok(Some(Bytes::from("c"))));
        assert_eq!(store.rpop("l"), Ok(Some(Bytes::from("b"))));
        assert_eq!(store.rpop("l"), Ok(None));
        assert_eq!(store.lpop("missing"), Ok(None));
        assert_eq!(store.llen("l"), Ok(0));
        assert_eq!(store.value_type("l"), ValueType::None);
    }

    #[test]
    fn list_index_symmetry() {
        let store = Store::new();
        push_all(&store, "l", &["a", "b", "c"]);

        let mut locked = store.lock();
        assert_eq!(locked.lindex("l", -1), Ok(Some(Bytes::from("c"))));
        assert_eq!(locked.lindex("l", 0), Ok(Some(Bytes::from("a"))));
        assert_eq!(locked.lindex("l", -3), Ok(Some(Bytes::from("a"))));
        assert_eq!(locked.lindex("l", 3), Ok(None));
        assert_eq!(locked.lindex("l", -4), Ok(None));
        assert_eq!(locked.lindex("missing", 0), Ok(None));

        assert_eq!(locked.lset("l", -1, Bytes::from("z")), Ok(()));
        assert_eq!(locked.lindex("l", 2), Ok(Some(Bytes::from("z"))));

        assert_eq!(
            locked.lset("l", 3, Bytes::from("x")),
            Err(StoreError::IndexOutOfRange)
        );
        assert_eq!(
            locked.lset("l", -4, Bytes::from("x")),
            Err(StoreError::IndexOutOfRange)
        );
        assert_eq!(
            locked.lset("missing", 0, Bytes::from("x")),
            Err(StoreError::NoSuchKey)
        );
        drop(locked);

        assert_eq!(
            list(&store, "l"),
            vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("z")]
        );
    }

    #[test]
    fn lrem_sign_semantics() {
        let items = ["a", "b", "a", "c", "a"];
        let cases: [(i64, &[&str]); 3] = [
            (2, &["b", "c", "a"]),
            (-1, &["a", "b", "a", "c"]),
            (0, &["b", "c"]),
        ];

        for (count, expected) in cases {
            let store = Store::new();
            push_all(&store, "l", &items);

            let removed = store.lock().lrem("l", count, b"a").unwrap();

            assert_eq!(removed, items.len() - expected.len(), "count {}", count);
            assert_eq!(
                list(&store, "l"),
                expected
                    .iter()
                    .map(|s| Bytes::copy_from_slice(s.as_bytes()))
                    .collect::<Vec<_>>(),
                "count {}",
                count
            );
        }
    }

    #[test]
    fn lrem_last_element_removes_key() {
        let store = Store::new();
        push_all(&store, "l", &["a", "a"]);

        assert_eq!(store.lock().lrem("l", 0, b"a"), Ok(2));
        assert!(!store.lock().exists("l"));
        assert_eq!(store.lock().lrem("l", 0, b"a"), Ok(0));
    }

    #[test]
    fn lrange_bounds() {
        let store = Store::new();
        push_all(&store, "l", &["a", "b", "c", "d"]);
        let mut store = store.lock();

        assert_eq!(store.lrange("l", 1, 2).unwrap(), vec!["b", "c"]);
        assert_eq!(store.lrange("l", -2, -1).unwrap(), vec!["c", "d"]);
        assert_eq!(store.lrange("l", -100, 100).unwrap().len(), 4);
        assert!(store.lrange("l", 3, 1).unwrap().is_empty());
        assert!(store.lrange("l", 5, 10).unwrap().is_empty());
        assert!(store.lrange("missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn hash_operations() {
        let store = Store::new();
        let mut store = store.lock();

        assert_eq!(store.hset("h", "f1".to_string(), Bytes::from("v1")), Ok(true));
        assert_eq!(store.hset("h", "f1".to_string(), Bytes::from("v2")), Ok(false));
        store
            .hmset(
                "h",
                vec![
                    ("f2".to_string(), Bytes::from("v2")),
                    ("f3".to_string(), Bytes::from("v3")),
                ],
            )
            .unwrap();

        assert_eq!(store.hget("h", "f1"), Ok(Some(Bytes::from("v2"))));
        assert_eq!(store.hget("h", "nope"), Ok(None));
        assert_eq!(store.hexists("h", "f3"), Ok(true));
        assert_eq!(store.hexists("missing", "f3"), Ok(false));
        assert_eq!(store.hlen("h"), Ok(3));

        let mut keys = store.hkeys("h").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["f1", "f2", "f3"]);

        let mut values = store.hvals("h").unwrap();
        values.sort();
        assert_eq!(values, vec!["v2", "v2", "v3"]);

        assert_eq!(store.hdel("h", "f1"), Ok(true));
        assert_eq!(store.hdel("h", "f1"), Ok(false));
        assert_eq!(store.hgetall("h").unwrap().len(), 2);
        assert!(store.hgetall("missing").unwrap().is_empty());

        store.hdel("h", "f2").unwrap();
        store.hdel("h", "f3").unwrap();
        assert_eq!(store.value_type("h"), ValueType::None);
    }

    #[test]
    fn rename_moves_value_and_ttl() {
        let store = Store::new();
        let mut store = store.lock();

        store.set("x".to_string(), Bytes::from("v"));
        store.expire("x", 100).unwrap();
        store.rpush("y", Bytes::from("old")).unwrap();

        assert!(store.rename("x", "y"));

        assert_eq!(store.get("y"), Ok(Some(Bytes::from("v"))));
        assert_eq!(store.get("x"), Ok(None));
        assert_eq!(store.ttl("y"), 100);
        assert_eq!(store.ttl("x"), -2);
        assert_eq!(store.state.ttls.len(), 1);

        assert!(!store.rename("x", "z"));
    }

    #[test]
    fn rename_hash() {
        let store = Store::new();
        let mut store = store.lock();

        store.hset("h", "f".to_string(), Bytes::from("v")).unwrap();

        assert!(store.rename("h", "h2"));
        assert!(store.rename("h2", "h2"));
        assert_eq!(store.hget("h2", "f"), Ok(Some(Bytes::from("v"))));
        assert_eq!(store.value_type("h"), ValueType::None);
    }

    #[test]
    fn flush_all_clears_everything() {
        let store = Store::new();
        let mut store = store.lock();

        store.set("s".to_string(), Bytes::from("v"));
        store.expire("s", 10).unwrap();
        store.rpush("l", Bytes::from("v")).unwrap();
        store.hset("h", "f".to_string(), Bytes::from("v")).unwrap();

        store.flush_all();

        assert!(store.keys().is_empty());
        assert!(store.state.ttls.is_empty());
    }

    #[test]
    fn dump_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.mdb");

        let store = Store::new();
        {
            let mut store = store.lock();
            store.set("greeting".to_string(), Bytes::from("hello"));
            store.rpush("letters", Bytes::from("a")).unwrap();
            store.rpush("letters", Bytes::from("b")).unwrap();
            store.rpush("letters", Bytes::from("c")).unwrap();
            store.hset("user", "name".to_string(), Bytes::from("ada")).unwrap();
            store.hset("user", "lang".to_string(), Bytes::from("rust")).unwrap();
        }
        store.dump(&path).unwrap();

        let restored = Store::new();
        restored.lock().set("stale".to_string(), Bytes::from("gone"));
        restored.load(&path).unwrap();
        let mut restored = restored.lock();

        let mut keys = restored.keys();
        keys.sort();
        assert_eq!(keys, vec!["greeting", "letters", "user"]);

        assert_eq!(restored.get("greeting"), Ok(Some(Bytes::from("hello"))));
        assert_eq!(
            restored.lrange("letters", 0, -1).unwrap(),
            vec!["a", "b", "c"]
        );
        assert_eq!(restored.value_type("user"), ValueType::Hash);
        assert_eq!(restored.hget("user", "name"), Ok(Some(Bytes::from("ada"))));
        assert_eq!(restored.hget("user", "lang"), Ok(Some(Bytes::from("rust"))));
    }

    #[test]
    fn dump_escapes_separators_and_binary_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.mdb");

        let mut rng = rand::thread_rng();
        let binary: Vec<u8> = (0..256).map(|_| rng.gen()).collect();
        let tricky = Bytes::from_static(b"a b\nc\r\\d:e\\s");

        let store = Store::new();
        {
            let mut store = store.lock();
            store.set("bin".to_string(), Bytes::from(binary.clone()));
            store.set("key with spaces".to_string(), tricky.clone());
            store.set("empty".to_string(), Bytes::new());
            store.rpush("l", Bytes::new()).unwrap();
            store.rpush("l", tricky.clone()).unwrap();
            store
                .hset("h", "field:with space".to_string(), tricky.clone())
                .unwrap();
        }
        store.dump(&path).unwrap();

        let restored = Store::new();
        restored.load(&path).unwrap();
        let mut restored = restored.lock();

        assert_eq!(restored.get("bin"), Ok(Some(Bytes::from(binary))));
        assert_eq!(restored.get("key with spaces"), Ok(Some(tricky.clone())));
        assert_eq!(restored.get("empty"), Ok(Some(Bytes::new())));
        assert_eq!(
            restored.lrange("l", 0, -1).unwrap(),
            vec![Bytes::new(), tricky.clone()]
        );
        assert_eq!(restored.hget("h", "field:with space"), Ok(Some(tricky)));
    }

    #[test]
    fn dump_does_not_keep_expirations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.mdb");

        let store = Store::new();
        store.lock().set("k".to_string(), Bytes::from("v"));
        store.lock().expire("k", 100).unwrap();
        store.dump(&path).unwrap();

        let restored = Store::new();
        restored.load(&path).unwrap();

        assert_eq!(restored.lock().ttl("k"), -1);
    }

    #[test]
    fn load_plain_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.mdb");
        fs::write(&path, "Kname ada\nLqueue one two\nH user age:36 city:london\n").unwrap();

        let store = Store::new();
        store.load(&path).unwrap();
        let mut store = store.lock();

        assert_eq!(store.get("name"), Ok(Some(Bytes::from("ada"))));
        assert_eq!(store.lrange("queue", 0, -1).unwrap(), vec!["one", "two"]);
        assert_eq!(store.hget("user", "city"), Ok(Some(Bytes::from("london"))));
        assert_eq!(store.hlen("user"), Ok(2));
    }

    #[test]
    fn dumps_differing_by_extension_do_not_share_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("dump.a");
        let second = dir.path().join("dump.b");

        assert_eq!(temp_path(&first), dir.path().join("dump.a.tmp"));
        assert_ne!(temp_path(&first), temp_path(&second));

        let store = Store::new();
        store.lock().set("key".to_string(), Bytes::from("a"));
        store.dump(&first).unwrap();
        store.lock().set("key".to_string(), Bytes::from("b"));
        store.dump(&second).unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        names.sort();
        assert_eq!(names, vec!["dump.a", "dump.b"]);

        store.load(&first).unwrap();
        assert_eq!(store.lock().get("key"), Ok(Some(Bytes::from("a"))));
    }

    #[test]
    fn failed_load_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new();
        store.lock().set("k".to_string(), Bytes::from("v"));

        let missing = store.load(dir.path().join("missing.mdb"));
        assert!(matches!(missing, Err(DumpError::Io(_))));

        let path = dir.path().join("broken.mdb");
        fs::write(&path, "Kgood value\nXbad record\n").unwrap();
        let malformed = store.load(&path);
        assert!(matches!(malformed, Err(DumpError::Malformed { line: 2, .. })));

        assert_eq!(store.lock().keys(), vec!["k"]);
    }

    #[test]
    fn concurrent_pushes_are_not_lost() {
        let store = Store::new();

        let handles: Vec<_> = (0..16)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let value = format!("{}-{}", worker, i);
                        store.lock().rpush("l", Bytes::from(value)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut items = list(&store, "l");
        assert_eq!(items.len(), 16 * 50);
        items.sort();
        items.dedup();
        assert_eq!(items.len(), 16 * 50);
    }
}
