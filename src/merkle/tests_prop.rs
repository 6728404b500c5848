use std::collections::HashSet;

use proptest::prelude::*;
use sha2::{Digest, Sha256};

use super::{MerkleHashable, Tree};

#[derive(Clone, Debug, PartialEq)]
struct Item(u64);

impl MerkleHashable for Item {
    fn merkle_hash(&self) -> Vec<u8> {
        Sha256::digest(self.0.to_be_bytes()).to_vec()
    }
}

fn distinct_items(values: Vec<u64>) -> Vec<Item> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(*value))
        .map(Item)
        .collect()
}

proptest! {
    fn every_member_has_a_verifying_proof(values in prop::collection::vec(any::<u64>(), 1..64)) {
        let items = distinct_items(values);
        let tree = Tree::new(items.clone()).expect("tree");
        prop_assert_eq!(tree.values().len(), items.len());
        for item in &items {
            let (siblings, orders) = tree.proof(item).expect("proof for member");
            prop_assert_eq!(siblings.len(), orders.len());
            prop_assert!(tree.verify(item));
        }
    }
}

proptest! {
    fn roots_are_stable_across_rebuilds(values in prop::collection::vec(any::<u64>(), 1..64)) {
        let items = distinct_items(values);
        let first = Tree::new(items.clone()).expect("tree");
        let second = Tree::new(items).expect("tree");
        prop_assert_eq!(first.root_hex(), second.root_hex());
    }
}

proptest! {
    fn non_members_never_verify(
        values in prop::collection::vec(any::<u64>(), 1..32),
        probe in any::<u64>(),
    ) {
        let items = distinct_items(values);
        prop_assume!(!items.contains(&Item(probe)));
        let tree = Tree::new(items).expect("tree");
        prop_assert!(!tree.verify(&Item(probe)));
        prop_assert!(tree.proof(&Item(probe)).is_none());
    }
}
