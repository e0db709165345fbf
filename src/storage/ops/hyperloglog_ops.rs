use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::Store;
use crate::storage::hyperloglog::HyperLogLog;
use crate::storage::types::{DataType, ObjectKind};

#[inline]
fn hll_mut(data: &mut DataType) -> Result<&mut HyperLogLog> {
    data.as_hyperloglog_mut().ok_or(Error::WrongType)
}

/// HyperLogLog operations for the Store
impl Store {
    // ==================== HyperLogLog operations ====================

    /// Add elements to HyperLogLog. True if a register changed or the key
    /// was created.
    pub fn pfadd(&mut self, key: &[u8], elements: &[Bytes]) -> Result<bool> {
        self.check_oom()?;
        self.modify_or_create(
            key,
            ObjectKind::HyperLogLog,
            |_| Ok(DataType::HyperLogLog(Box::default())),
            |data, created| {
                let hll = hll_mut(data)?;
                let mut changed = created;
                for element in elements {
                    changed |= hll.add(element);
                }
                Ok(changed)
            },
        )
    }

    /// Type-check and lazily expire every key, then borrow the live HLLs
    fn live_hlls(&mut self, keys: &[Bytes]) -> Result<Vec<&HyperLogLog>> {
        for key in keys {
            self.read_value(key, ObjectKind::HyperLogLog)?;
        }
        Ok(keys
            .iter()
            .filter_map(|key| self.data.get(key))
            .filter_map(|entry| entry.data.as_hyperloglog())
            .collect())
    }

    /// Approximate cardinality of the union of the given keys. Missing keys
    /// count as empty; none of the HLLs is modified.
    pub fn pfcount(&mut self, keys: &[Bytes]) -> Result<u64> {
        let hlls = self.live_hlls(keys)?;
        match hlls.as_slice() {
            [] => Ok(0),
            // Single key is served from the cached cardinality
            [hll] => Ok(hll.count()),
            _ => Ok(HyperLogLog::count_union(hlls.iter().copied())),
        }
    }

    /// Fold the registers of `sources` into `dest`, creating it if absent
    pub fn pfmerge(&mut self, dest: &[u8], sources: &[Bytes]) -> Result<()> {
        let mut union = HyperLogLog::new();
        for hll in self.live_hlls(sources)? {
            union.merge(hll);
        }

        self.check_oom()?;
        self.modify_or_create(
            dest,
            ObjectKind::HyperLogLog,
            |_| Ok(DataType::HyperLogLog(Box::default())),
            |data, _| {
                hll_mut(data)?.merge(&union);
                Ok(())
            },
        )
    }

    /// Unpacked registers, for debugging
    pub fn pf_registers(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self.read_value(key, ObjectKind::HyperLogLog)?;
        Ok(value.and_then(|v| v.as_hyperloglog()).map(|hll| hll.registers()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::hyperloglog::HLL_REGISTERS;

    fn elements(prefix: &str, n: usize) -> Vec<Bytes> {
        (0..n).map(|i| Bytes::from(format!("{}{}", prefix, i))).collect()
    }

    fn keys(names: &[&'static [u8]]) -> Vec<Bytes> {
        names.iter().map(|&n| Bytes::from_static(n)).collect()
    }

    #[test]
    fn test_pfadd_changed() {
        let mut store = Store::default();
        // Creating the key counts as a change
        assert!(store.pfadd(b"hll", &[]).unwrap());
        assert!(!store.pfadd(b"hll", &[]).unwrap());
        assert!(store.pfadd(b"hll", &elements("a", 1)).unwrap());
        assert!(!store.pfadd(b"hll", &elements("a", 1)).unwrap());
    }

    #[test]
    fn test_alphabet_count() {
        let mut store = Store::default();
        let alphabet: Vec<Bytes> = (b'a'..=b'z').map(|c| Bytes::from(vec![c])).collect();
        store.pfadd(b"hll", &alphabet).unwrap();
        let count = store.pfcount(&keys(&[b"hll"])).unwrap() as f64;
        assert!((count - 26.0).abs() <= 26.0 * 0.03 + 1.0, "count {}", count);
    }

    #[test]
    fn test_pfcount_union_is_commutative_and_non_destructive() {
        let mut store = Store::default();
        store.pfadd(b"a", &elements("a", 2000)).unwrap();
        store.pfadd(b"b", &elements("b", 3000)).unwrap();
        let a_alone = store.pfcount(&keys(&[b"a"])).unwrap();

        let ab = store.pfcount(&keys(&[b"a", b"b"])).unwrap();
        let ba = store.pfcount(&keys(&[b"b", b"a"])).unwrap();
        assert_eq!(ab, ba);
        assert!((ab as f64 - 5000.0).abs() < 5000.0 * 0.05, "union {}", ab);
        assert_eq!(store.pfcount(&keys(&[b"a"])).unwrap(), a_alone);

        // Missing keys count as empty
        assert_eq!(store.pfcount(&keys(&[b"a", b"missing"])).unwrap(), a_alone);
        assert_eq!(store.pfcount(&keys(&[b"missing"])).unwrap(), 0);
    }

    #[test]
    fn test_pfmerge_associative() {
        let mut store = Store::default();
        store.pfadd(b"a", &elements("a", 1000)).unwrap();
        store.pfadd(b"b", &elements("b", 1000)).unwrap();
        store.pfadd(b"c", &elements("c", 1000)).unwrap();

        store.pfmerge(b"ab", &keys(&[b"a", b"b"])).unwrap();
        store.pfmerge(b"pairwise", &keys(&[b"ab", b"c"])).unwrap();
        store.pfmerge(b"at_once", &keys(&[b"a", b"b", b"c"])).unwrap();

        assert_eq!(
            store.pf_registers(b"pairwise").unwrap(),
            store.pf_registers(b"at_once").unwrap()
        );
        assert_eq!(
            store.pfcount(&keys(&[b"pairwise"])).unwrap(),
            store.pfcount(&keys(&[b"a", b"b", b"c"])).unwrap()
        );
    }

    #[test]
    fn test_pfmerge_into_existing_and_empty() {
        let mut store = Store::default();
        store.pfadd(b"dest", &elements("d", 100)).unwrap();
        store.pfadd(b"src", &elements("s", 100)).unwrap();
        store.pfmerge(b"dest", &keys(&[b"src"])).unwrap();
        let merged = store.pfcount(&keys(&[b"dest"])).unwrap();
        assert!((190..=210).contains(&merged), "merged {}", merged);

        store.pfmerge(b"empty", &[]).unwrap();
        let registers = store.pf_registers(b"empty").unwrap().unwrap();
        assert_eq!(registers.len(), HLL_REGISTERS);
        assert!(registers.iter().all(|&r| r == 0));
        assert_eq!(store.pf_registers(b"missing").unwrap(), None);
    }

    #[test]
    fn test_wrong_type() {
        let mut store = Store::default();
        store.set(Bytes::from_static(b"s"), Bytes::from_static(b"v")).unwrap();
        assert!(matches!(store.pfadd(b"s", &elements("a", 1)), Err(Error::WrongType)));
        assert!(matches!(store.pfcount(&keys(&[b"s"])), Err(Error::WrongType)));
        assert!(matches!(store.pfmerge(b"d", &keys(&[b"s"])), Err(Error::WrongType)));
        assert!(!store.exists(b"d"));
    }
}
