//! Point-in-time readers over the store's hash keys.
//!
//! Both readers take the store handle explicitly so callers decide how the
//! connection is built, and tests can hand in an in-process fake.

use std::collections::{btree_map, BTreeMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::Result;

/// Key pattern read by `miner-scan` unless overridden.
pub const DEFAULT_MINER_PATTERN: &str = "eth:miners:*";

/// Aggregate hash read by `miner-boards` unless overridden.
pub const DEFAULT_BOARDS_KEY: &str = "minerBoards";

/// `COUNT` hint sent with each `SCAN` page.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// The field/value pairs of one hash, ordered by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashFields(BTreeMap<String, String>);

impl HashFields {
    pub fn new() -> HashFields {
        HashFields(BTreeMap::new())
    }

    /// Returns the previous value when `field` was already present.
    pub fn insert(&mut self, field: String, value: String) -> Option<String> {
        self.0.insert(field, value)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for HashFields {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> HashFields {
        HashFields(iter.into_iter().collect())
    }
}

impl IntoIterator for HashFields {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a HashFields {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Renders as `{"field": "value", ...}`.
impl fmt::Display for HashFields {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{{")?;
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(fmt, ", ")?;
            }
            write!(fmt, "{:?}: {:?}", field, value)?;
        }
        write!(fmt, "}}")
    }
}

/// One page of a cursor-based key enumeration. A `cursor` of zero means the
/// enumeration is complete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// The two reads the snapshot operations need from a store.
#[allow(async_fn_in_trait)]
pub trait HashStore {
    async fn scan_page(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage>;

    /// Returns an empty mapping when `key` does not exist.
    async fn hgetall(&mut self, key: &str) -> Result<HashFields>;
}

/// Enumerates every key matching `pattern` and hands each one, with its hash
/// contents, to `visit` as soon as it has been fetched.
///
/// Only one `SCAN` page is held at a time. A key the store reports on more
/// than one page is visited once. Returns the number of keys visited.
pub async fn scan_hashes<S, F>(
    store: &mut S,
    pattern: &str,
    count: usize,
    mut visit: F,
) -> Result<usize>
where
    S: HashStore,
    F: FnMut(String, HashFields),
{
    let mut seen = HashSet::new();
    let mut cursor = 0;

    loop {
        let page = store.scan_page(cursor, pattern, count).await?;
        debug!(cursor, next = page.cursor, keys = page.keys.len(), "scan page");

        for key in page.keys {
            if seen.contains(&key) {
                continue;
            }
            let fields = store.hgetall(&key).await?;
            seen.insert(key.clone());
            visit(key, fields);
        }

        if page.cursor == 0 {
            break;
        }
        cursor = page.cursor;
    }

    Ok(seen.len())
}

/// Like `scan_hashes`, but gathers the results in enumeration order.
pub async fn collect_hashes<S: HashStore>(
    store: &mut S,
    pattern: &str,
    count: usize,
) -> Result<Vec<(String, HashFields)>> {
    let mut out = Vec::new();
    scan_hashes(store, pattern, count, |key, fields| out.push((key, fields))).await?;
    Ok(out)
}

/// Reads all fields of the hash stored at `key`.
///
/// A missing key yields an empty mapping; a store that cannot be reached
/// yields an error, so the two cases stay distinguishable.
pub async fn fetch_hash<S: HashStore>(store: &mut S, key: &str) -> Result<HashFields> {
    let fields = store.hgetall(key).await?;
    debug!(key, fields = fields.len(), "fetched hash");
    Ok(fields)
}
