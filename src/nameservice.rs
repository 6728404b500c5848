//! Human-readable names for well-known accounts, derived from the key files
//! in the accounts folder: `alice.ecdsa` names the account its key controls.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::crypto::{address_from_key, load_private_key};
use crate::errors::ChainResult;
use crate::types::AccountId;

pub struct NameService {
    accounts: HashMap<AccountId, String>,
}

impl NameService {
    /// Service with no names; every lookup falls back to the hex id.
    pub fn empty() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    /// Walks `root` for `*.ecdsa` files and maps each derived account id to
    /// the file stem. A missing folder yields an empty service.
    pub fn new(root: &Path) -> ChainResult<Self> {
        let mut accounts = HashMap::new();
        if root.is_dir() {
            for entry in fs::read_dir(root)? {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("ecdsa") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                    continue;
                };
                let key = load_private_key(&path)?;
                accounts.insert(address_from_key(key.verifying_key()), name.to_string());
            }
        }
        Ok(Self { accounts })
    }

    /// The name for the account, falling back to its hex form.
    pub fn lookup(&self, account_id: &AccountId) -> String {
        self.accounts
            .get(account_id)
            .cloned()
            .unwrap_or_else(|| account_id.to_string())
    }

    pub fn copy(&self) -> HashMap<AccountId, String> {
        self.accounts.clone()
    }
}
