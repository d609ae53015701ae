//! Disjoint sets over accounts, stored as an index arena

use std::collections::HashMap;

use tessera_primitives::Address;

/// Union by rank with path halving
#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn make_set(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => {
                self.parent[ra] = rb;
                rb
            }
            std::cmp::Ordering::Greater => {
                self.parent[rb] = ra;
                ra
            }
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
                ra
            }
        }
    }
}

/// Accounts merged into connected sets
#[derive(Debug, Default)]
pub(crate) struct AccountSets {
    index: HashMap<Address, usize>,
    sets: UnionFind,
}

impl AccountSets {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, account: Address) -> usize {
        if let Some(id) = self.index.get(&account) {
            return *id;
        }
        let id = self.sets.make_set();
        self.index.insert(account, id);
        id
    }

    /// Merge every account in `accounts` into one set, returning its root
    pub(crate) fn union_all(&mut self, accounts: &[Address]) -> Option<usize> {
        let (first, rest) = accounts.split_first()?;
        let mut root = self.node(*first);
        for account in rest {
            let other = self.node(*account);
            root = self.sets.union(root, other);
        }
        Some(root)
    }

    /// Current root of `account`'s set
    pub(crate) fn root(&mut self, account: &Address) -> Option<usize> {
        let id = *self.index.get(account)?;
        Some(self.sets.find(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_transitive_merge() {
        let mut sets = AccountSets::new();
        sets.union_all(&[a(0), a(1)]);
        sets.union_all(&[a(2), a(1)]);
        sets.union_all(&[a(5), a(6)]);

        assert_eq!(sets.root(&a(0)), sets.root(&a(2)));
        assert_ne!(sets.root(&a(0)), sets.root(&a(5)));
        assert_eq!(sets.root(&a(9)), None);
    }

    #[test]
    fn test_long_chain_shares_root() {
        let mut sets = AccountSets::new();
        for i in 0..1_000 {
            sets.union_all(&[a(i), a(i + 1)]);
        }
        let root = sets.root(&a(0));
        assert_eq!(sets.root(&a(1_000)), root);
        assert_eq!(sets.root(&a(500)), root);
    }

    #[test]
    fn test_empty_union() {
        let mut sets = AccountSets::new();
        assert_eq!(sets.union_all(&[]), None);
        assert!(sets.union_all(&[a(3)]).is_some());
        assert!(sets.root(&a(3)).is_some());
    }
}
