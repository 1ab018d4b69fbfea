//! Loads output records from SQLite, maintains a binary row cache on disk,
//! and splits the loaded rows into the blocks the forest is built from at
//! startup and the blocks held back for `POST /update`.

use std::path::{
    Path,
    PathBuf,
};

use eyre::WrapErr as _;
use serde::{
    Deserialize,
    Serialize,
};

use crate::forest::OutputRecord;

/// One row of `out_table`, in the shape it round-trips through the binary
/// cache and is read from SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row {
    block_hash: String,
    tx_hash: String,
    outkey: Vec<u8>,
    idx: u64,
}

impl From<Row> for OutputRecord {
    fn from(row: Row) -> Self {
        OutputRecord {
            block_hash: row.block_hash,
            tx_hash: row.tx_hash,
            outkey: row.outkey,
            idx: row.idx,
        }
    }
}

/// A FIFO of whole blocks, each block a contiguous run of [`OutputRecord`]s
/// sharing a `block_hash`, waiting to be drained one at a time by
/// `POST /update`.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    blocks: std::collections::VecDeque<Vec<OutputRecord>>,
}

impl PendingBuffer {
    /// Builds a buffer from an already block-grouped list, front to back.
    #[must_use]
    pub fn from_blocks(blocks: Vec<Vec<OutputRecord>>) -> Self {
        Self {
            blocks: blocks.into(),
        }
    }

    /// Pops the next buffered block, if any.
    pub fn pop_front(&mut self) -> Option<Vec<OutputRecord>> {
        self.blocks.pop_front()
    }

    /// Number of whole blocks still buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// The result of loading: the records to build the forest from at startup,
/// and the remaining blocks to serve later via `POST /update`.
pub struct Loaded {
    pub initial_records: Vec<OutputRecord>,
    pub pending: PendingBuffer,
}

/// Reads all rows of `out_table` ordered by `idx`, using the on-disk cache
/// under `data_dir` when present and falling back to `db_path` on a cache
/// miss (absent or corrupt cache file), then splits the result into an
/// initial batch and a `pending_blocks`-sized tail.
///
/// A successful SQLite read is written back to the cache. The split is in
/// whole blocks: `pending_blocks` counts trailing blocks, not rows.
///
/// # Errors
/// Returns an error if the cache is missing/corrupt *and* the SQLite
/// database cannot be opened or queried, or if writing the refreshed cache
/// fails.
pub fn load(db_path: &str, data_dir: &str, pending_blocks: u64) -> eyre::Result<Loaded> {
    let cache_path = cache_path_for(data_dir, db_path);

    let rows = match read_cache(&cache_path) {
        Ok(rows) => {
            tracing::info!(path = %cache_path.display(), "loaded output rows from cache");
            rows
        }
        Err(err) => {
            tracing::info!(%err, "row cache unavailable, reading from sqlite");
            let rows = read_sqlite(db_path)?;
            if let Err(err) = write_cache(&cache_path, &rows) {
                tracing::warn!(%err, "failed to persist row cache");
            }
            rows
        }
    };

    let records: Vec<OutputRecord> = rows.into_iter().map(OutputRecord::from).collect();
    let blocks = group_by_block(records);

    let total_blocks = blocks.len();
    let initial_block_count = total_blocks.saturating_sub(pending_blocks as usize);
    let mut blocks = blocks;
    let pending = blocks.split_off(initial_block_count);

    Ok(Loaded {
        initial_records: blocks.into_iter().flatten().collect(),
        pending: PendingBuffer::from_blocks(pending),
    })
}

fn group_by_block(records: Vec<OutputRecord>) -> Vec<Vec<OutputRecord>> {
    let mut groups: Vec<Vec<OutputRecord>> = Vec::new();
    for record in records {
        let starts_new_group = match groups.last() {
            Some(group) => group.last().expect("group is never empty").block_hash != record.block_hash,
            None => true,
        };
        if starts_new_group {
            groups.push(Vec::new());
        }
        groups.last_mut().expect("just pushed").push(record);
    }
    groups
}

fn cache_path_for(data_dir: &str, db_path: &str) -> PathBuf {
    let db_name = Path::new(db_path)
        .file_name()
        .map_or_else(|| "out_table".to_string(), |name| name.to_string_lossy().into_owned());
    Path::new(data_dir).join(format!("{db_name}.cache.bin"))
}

fn read_cache(path: &Path) -> eyre::Result<Vec<Row>> {
    let bytes = std::fs::read(path).wrap_err("cache file not readable")?;
    bincode::deserialize(&bytes).wrap_err("cache file is corrupt")
}

fn write_cache(path: &Path, rows: &[Row]) -> eyre::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).wrap_err("failed to create cache directory")?;
    }
    let bytes = bincode::serialize(rows).wrap_err("failed to serialize row cache")?;
    std::fs::write(path, bytes).wrap_err("failed to write row cache")
}

fn read_sqlite(db_path: &str) -> eyre::Result<Vec<Row>> {
    let conn = rusqlite::Connection::open(db_path)
        .wrap_err_with(|| format!("failed to open sqlite database at {db_path}"))?;
    let mut stmt = conn
        .prepare("SELECT block_hash, tx_hash, outkey, idx FROM out_table ORDER BY idx")
        .wrap_err("failed to prepare out_table query")?;
    let rows = stmt
        .query_map([], |row| {
            let idx: i64 = row.get(3)?;
            Ok(Row {
                block_hash: row.get(0)?,
                tx_hash: row.get(1)?,
                outkey: row.get(2)?,
                idx: idx as u64,
            })
        })
        .wrap_err("failed to query out_table")?
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("failed to read a row of out_table")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn seed_db(path: &Path) {
        let conn = rusqlite::Connection::open(path).expect("open");
        conn.execute(
            "CREATE TABLE out_table (block_hash TEXT, tx_hash TEXT, outkey BLOB, idx INTEGER)",
            [],
        )
        .expect("create table");
        let rows = [
            ("blk0", "tx0", b"out0".to_vec(), 0i64),
            ("blk0", "tx0", b"out1".to_vec(), 1),
            ("blk1", "tx1", b"out2".to_vec(), 2),
        ];
        for (block_hash, tx_hash, outkey, idx) in rows {
            conn.execute(
                "INSERT INTO out_table (block_hash, tx_hash, outkey, idx) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![block_hash, tx_hash, outkey, idx],
            )
            .expect("insert");
        }
    }

    #[test]
    fn load_splits_trailing_block_into_pending() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("outputs.sqlite3");
        seed_db(&db_path);

        let loaded = load(
            db_path.to_str().expect("utf8 path"),
            dir.path().join("cache").to_str().expect("utf8 path"),
            1,
        )
        .expect("loads");

        assert_eq!(loaded.initial_records.len(), 2, "only blk0 is built at startup");
        assert_eq!(loaded.pending.len(), 1, "blk1 is held back");
    }

    #[test]
    fn cache_round_trip_matches_database_load() {
        let dir = tempdir().expect("tempdir");
        let db_path = dir.path().join("outputs.sqlite3");
        let cache_dir = dir.path().join("cache");
        seed_db(&db_path);

        let from_db = load(db_path.to_str().unwrap(), cache_dir.to_str().unwrap(), 0).expect("loads");

        std::fs::remove_file(&db_path).expect("remove database");
        let from_cache = load(db_path.to_str().unwrap(), cache_dir.to_str().unwrap(), 0)
            .expect("loads from cache alone");

        assert_eq!(from_db.initial_records.len(), from_cache.initial_records.len());
        assert_eq!(from_db.pending.len(), from_cache.pending.len());
    }
}
