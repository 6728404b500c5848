//! Append-only block persistence: one JSON file per block number, starting
//! at 1. A missing number ends iteration, which is how the chain length is
//! discovered on startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{ChainError, ChainResult};
use crate::types::BlockData;

pub struct BlockStore {
    root: PathBuf,
}

impl BlockStore {
    pub fn open(path: &Path) -> ChainResult<Self> {
        fs::create_dir_all(path)?;
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Writes the block under its number. Rewriting an existing number
    /// overwrites it.
    pub fn write(&self, data: &BlockData) -> ChainResult<()> {
        let encoded = serde_json::to_vec_pretty(data)?;
        fs::write(self.block_path(data.header.number), encoded)?;
        Ok(())
    }

    pub fn get(&self, number: u64) -> ChainResult<BlockData> {
        let raw = match fs::read(self.block_path(number)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ChainError::NotFound)
            }
            Err(err) => return Err(ChainError::Io(err)),
        };
        serde_json::from_slice(&raw)
            .map_err(|err| ChainError::Corrupted(format!("block {number}: {err}")))
    }

    /// Lazy walk from block 1 upward, stopping at the first missing number.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            store: self,
            next: 1,
        }
    }

    /// Discards every persisted block.
    pub fn reset(&self) -> ChainResult<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn block_path(&self, number: u64) -> PathBuf {
        self.root.join(format!("{number}.json"))
    }
}

pub struct BlockIter<'a> {
    store: &'a BlockStore,
    next: u64,
}

impl Iterator for BlockIter<'_> {
    type Item = ChainResult<BlockData>;

    fn next(&mut self) -> Option<Self::Item> {
        let number = self.next;
        self.next += 1;
        match self.store.get(number) {
            Ok(data) => Some(Ok(data)),
            Err(ChainError::NotFound) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
