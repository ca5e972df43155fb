//! 保持插入顺序的键值表。
//!
//! 哈希索引提供 O(1) 平均查找，槽位数组记录插入顺序。删除只把槽位
//! 置空（墓碑），迭代与查找都会跳过墓碑；墓碑超过槽位数组的 2/3 时整体压缩。
//! 覆盖写入保留原有位置，删除后再插入的键排到末尾。

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct KvStore<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Option<(K, V)>>,
    tombstones: usize,
}

impl<K, V> Default for KvStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KvStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            tombstones: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            tombstones: 0,
        }
    }

    /// 插入或覆盖。返回旧值（若存在）。
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&position) = self.index.get(&key) {
            if let Some((_, slot_value)) = self.slots[position].as_mut() {
                return Some(std::mem::replace(slot_value, value));
            }
        }
        let position = self.slots.len();
        self.index.insert(key.clone(), position);
        self.slots.push(Some((key, value)));
        None
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = *self.index.get(key)?;
        self.slots[position].as_ref().map(|(_, value)| value)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = *self.index.get(key)?;
        self.slots[position].as_mut().map(|(_, value)| value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// 删除键并返回其值；表内的键副本随之释放。
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = self.index.remove(key)?;
        let (_, value) = self.slots[position].take()?;
        self.tombstones += 1;
        if self.tombstones * 3 > self.slots.len() * 2 {
            self.compact();
        }
        Some(value)
    }

    /// 存活条目数（不含墓碑）。
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 当前墓碑数量。
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.tombstones = 0;
    }

    pub fn first_key(&self) -> Option<&K> {
        self.slots.iter().flatten().map(|(key, _)| key).next()
    }

    /// 按插入顺序返回 `key` 之后的下一个键。
    pub fn next_key<Q>(&self, key: &Q) -> Option<&K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = *self.index.get(key)?;
        self.slots[position + 1..]
            .iter()
            .flatten()
            .map(|(key, _)| key)
            .next()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots
            .iter()
            .flatten()
            .map(|(key, value)| (key, value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.slots
            .iter_mut()
            .flatten()
            .map(|(key, value)| (&*key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    fn compact(&mut self) {
        let live = std::mem::take(&mut self.slots);
        self.slots = Vec::with_capacity(self.index.len());
        for (key, value) in live.into_iter().flatten() {
            self.index.insert(key.clone(), self.slots.len());
            self.slots.push(Some((key, value)));
        }
        self.tombstones = 0;
    }
}
