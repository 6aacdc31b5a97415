// SPDX-License-Identifier: MPL-2.0

use std::hash::Hash;

use crate::Map;

/// A map staying on the stack for up to two entries.
///
/// Incompatibilities hold terms for one or two subjects in the overwhelming
/// majority of cases, so those live inline; conflict resolution can grow a
/// map beyond that, at which point it spills into a hash map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SmallMap<K: Eq + Hash, V> {
    Empty,
    One([(K, V); 1]),
    Two([(K, V); 2]),
    Flexible(Map<K, V>),
}

impl<K: PartialEq + Eq + Hash, V> SmallMap<K, V> {
    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        match self {
            Self::Empty => None,
            Self::One([(k, v)]) => {
                if k == key {
                    Some(v)
                } else {
                    None
                }
            }
            Self::Two([(k1, v1), (k2, v2)]) => {
                if k1 == key {
                    Some(v1)
                } else if k2 == key {
                    Some(v2)
                } else {
                    None
                }
            }
            Self::Flexible(map) => map.get(key),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Two(_) => 2,
            Self::Flexible(map) => map.len(),
        }
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        match std::mem::replace(self, Self::Empty) {
            Self::Empty => *self = Self::One([(key, value)]),
            Self::One([(k1, v1)]) => {
                if k1 == key {
                    *self = Self::One([(k1, value)]);
                } else {
                    *self = Self::Two([(k1, v1), (key, value)]);
                }
            }
            Self::Two([(k1, v1), (k2, v2)]) => {
                if k1 == key {
                    *self = Self::Two([(k1, value), (k2, v2)]);
                } else if k2 == key {
                    *self = Self::Two([(k1, v1), (k2, value)]);
                } else {
                    let mut map = Map::with_capacity_and_hasher(3, Default::default());
                    map.insert(k1, v1);
                    map.insert(k2, v2);
                    map.insert(key, value);
                    *self = Self::Flexible(map);
                }
            }
            Self::Flexible(mut map) => {
                map.insert(key, value);
                *self = Self::Flexible(map);
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        match std::mem::replace(self, Self::Empty) {
            Self::Empty => None,
            Self::One([(k1, v1)]) => {
                if &k1 == key {
                    Some(v1)
                } else {
                    *self = Self::One([(k1, v1)]);
                    None
                }
            }
            Self::Two([(k1, v1), (k2, v2)]) => {
                if &k1 == key {
                    *self = Self::One([(k2, v2)]);
                    Some(v1)
                } else if &k2 == key {
                    *self = Self::One([(k1, v1)]);
                    Some(v2)
                } else {
                    *self = Self::Two([(k1, v1), (k2, v2)]);
                    None
                }
            }
            Self::Flexible(mut map) => {
                let out = map.remove(key);
                *self = Self::Flexible(map);
                out
            }
        }
    }

    /// Returns a copy of the value for `key` together with the rest of the
    /// map, leaving `self` untouched. Faster than cloning the whole map and
    /// removing the key from the clone.
    pub(crate) fn split_one(&self, key: &K) -> Option<(V, Self)>
    where
        K: Clone,
        V: Clone,
    {
        match self {
            Self::Empty => None,
            Self::One([(k1, v1)]) => {
                if k1 == key {
                    Some((v1.clone(), Self::Empty))
                } else {
                    None
                }
            }
            Self::Two([(k1, v1), (k2, v2)]) => {
                if k1 == key {
                    Some((v1.clone(), Self::One([(k2.clone(), v2.clone())])))
                } else if k2 == key {
                    Some((v2.clone(), Self::One([(k1.clone(), v1.clone())])))
                } else {
                    None
                }
            }
            Self::Flexible(map) => {
                let value = map.get(key)?.clone();
                let rest = map
                    .iter()
                    .filter(|(k, _)| k != &key)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Some((value, Self::Flexible(rest)))
            }
        }
    }

    /// Merge the entries of `iter` into `self`. Keys present on both sides
    /// go through `f`; a `None` result drops the key from the map.
    pub(crate) fn merge<'a>(
        &mut self,
        iter: impl Iterator<Item = (&'a K, &'a V)>,
        f: impl Fn(&V, &V) -> Option<V>,
    ) where
        K: Clone + 'a,
        V: Clone + 'a,
    {
        for (key, value) in iter {
            let merged = match self.get(key) {
                None => None,
                Some(existing) => Some(f(existing, value)),
            };
            match merged {
                None => self.insert(key.clone(), value.clone()),
                Some(Some(value)) => self.insert(key.clone(), value),
                Some(None) => {
                    self.remove(key);
                }
            }
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        match self {
            Self::Empty => IterSmallMap::Inline([].iter()),
            Self::One(data) => IterSmallMap::Inline(data.iter()),
            Self::Two(data) => IterSmallMap::Inline(data.iter()),
            Self::Flexible(map) => IterSmallMap::Map(map.iter()),
        }
    }
}

enum IterSmallMap<'a, K, V> {
    Inline(std::slice::Iter<'a, (K, V)>),
    Map(std::collections::hash_map::Iter<'a, K, V>),
}

impl<'a, K, V> Iterator for IterSmallMap<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Inline(iter) => iter.next().map(|(k, v)| (k, v)),
            Self::Map(iter) => iter.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_through_every_representation() {
        let mut map: SmallMap<u32, u32> = SmallMap::Empty;
        for n in 0..4 {
            map.insert(n, n * 10);
            assert_eq!(map.len(), n as usize + 1);
        }
        for n in 0..4 {
            assert_eq!(map.get(&n), Some(&(n * 10)));
        }
        map.insert(2, 99);
        assert_eq!(map.get(&2), Some(&99));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn split_one_leaves_the_rest() {
        let map = SmallMap::Two([(1u32, "a"), (2u32, "b")]);
        let (value, rest) = map.split_one(&1).unwrap();
        assert_eq!(value, "a");
        assert_eq!(rest.get(&2), Some(&"b"));
        assert_eq!(rest.len(), 1);
        assert!(map.split_one(&3).is_none());
    }

    #[test]
    fn merge_combines_and_drops() {
        let mut map = SmallMap::One([(1u32, 2u32)]);
        let other = [(&1u32, &3u32), (&2u32, &5u32)];
        map.merge(other.into_iter(), |a, b| {
            if a + b > 4 {
                Some(a + b)
            } else {
                None
            }
        });
        // 2 + 3 > 4 so the key stays, merged.
        assert_eq!(map.get(&1), Some(&5));
        // 2 was absent, inserted untouched.
        assert_eq!(map.get(&2), Some(&5));
    }
}
