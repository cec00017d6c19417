use std::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID, PAGE_SIZE};
use crate::index::btree::key::IndexKey;
use crate::index::btree::page::{read_next_page_id, NodeType, NodeView, NodeViewMut, NODE_HEADER_SIZE};

const RID_SIZE: usize = 8;

/// View over a leaf node page: a sorted array of `(key, rid)` entries plus
/// the next-leaf link that threads leaves into a scan chain.
///
/// The buffer parameter is either a shared or an exclusive borrow of the
/// page bytes, so one type serves both read- and write-latched access.
pub struct LeafNode<B, K> {
    data: B,
    _key: PhantomData<K>,
}

impl<B: AsRef<[u8]>, K: IndexKey> LeafNode<B, K> {
    pub fn new(data: B) -> Self {
        Self {
            data,
            _key: PhantomData,
        }
    }

    fn entry_size() -> usize {
        K::ENCODED_SIZE + RID_SIZE
    }

    /// How many entries fit on a page of this key type.
    pub fn capacity() -> usize {
        (PAGE_SIZE - NODE_HEADER_SIZE) / Self::entry_size()
    }

    fn entry_offset(index: usize) -> usize {
        NODE_HEADER_SIZE + index * Self::entry_size()
    }

    pub fn key_at(&self, index: usize) -> K {
        debug_assert!(index < self.size());
        let off = Self::entry_offset(index);
        K::decode(&self.raw()[off..off + K::ENCODED_SIZE])
    }

    pub fn rid_at(&self, index: usize) -> Rid {
        debug_assert!(index < self.size());
        let off = Self::entry_offset(index) + K::ENCODED_SIZE;
        Rid::new(
            LittleEndian::read_u32(&self.raw()[off..off + 4]),
            LittleEndian::read_u32(&self.raw()[off + 4..off + 8]),
        )
    }

    pub fn next_page_id(&self) -> PageId {
        read_next_page_id(self.raw())
    }

    /// Binary search for `key`.
    pub fn lookup(&self, key: &K) -> Option<Rid> {
        let size = self.size();
        if size == 0 {
            return None;
        }

        let (mut low, mut high) = (0usize, size - 1);
        while low <= high {
            let mid = low + (high - low) / 2;
            match self.key_at(mid).cmp(key) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => {
                    if mid == 0 {
                        return None;
                    }
                    high = mid - 1;
                }
                std::cmp::Ordering::Equal => return Some(self.rid_at(mid)),
            }
        }
        None
    }

    /// First index whose key is >= `key`; `size()` when every key is
    /// smaller. Range scans start here.
    pub fn key_index(&self, key: &K) -> usize {
        let size = self.size();
        let mut low = 0usize;
        let mut high = size;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.key_at(mid) < *key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: IndexKey> LeafNode<B, K> {
    /// Initialize a fresh page as an empty leaf.
    pub fn init(&mut self, page_id: PageId, parent_id: PageId, max_size: usize) {
        debug_assert!(max_size >= 3);
        debug_assert!(max_size <= Self::capacity());
        self.set_node_type(NodeType::Leaf);
        self.set_size(0);
        self.set_max_size(max_size);
        self.set_page_id(page_id);
        self.set_parent_page_id(parent_id);
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        self.set_next_page_id_raw(next);
    }

    fn write_entry(&mut self, index: usize, key: &K, rid: Rid) {
        let off = Self::entry_offset(index);
        let raw = self.raw_mut();
        key.encode(&mut raw[off..off + K::ENCODED_SIZE]);
        let off = off + K::ENCODED_SIZE;
        LittleEndian::write_u32(&mut raw[off..off + 4], rid.page_id);
        LittleEndian::write_u32(&mut raw[off + 4..off + 8], rid.slot);
    }

    /// Insert in sorted position. The caller has checked the key is not
    /// present and the page has room.
    pub fn insert(&mut self, key: &K, rid: Rid) -> usize {
        let size = self.size();
        let index = self.key_index(key);

        if index < size {
            let start = Self::entry_offset(index);
            let end = Self::entry_offset(size);
            let dest = start + Self::entry_size();
            self.raw_mut().copy_within(start..end, dest);
        }
        self.write_entry(index, key, rid);
        self.set_size(size + 1);
        size + 1
    }

    /// Remove `key` if present, keeping entries dense. Returns whether a
    /// removal happened.
    pub fn remove(&mut self, key: &K) -> bool {
        let size = self.size();
        let index = self.key_index(key);
        if index >= size || self.key_at(index) != *key {
            return false;
        }

        if index + 1 < size {
            let start = Self::entry_offset(index + 1);
            let end = Self::entry_offset(size);
            let dest = Self::entry_offset(index);
            self.raw_mut().copy_within(start..end, dest);
        }
        self.set_size(size - 1);
        true
    }

    /// Move the last `count` entries into `recipient`, which must be an
    /// empty, freshly initialized leaf. Split helper.
    pub fn move_tail_to<B2>(&mut self, recipient: &mut LeafNode<B2, K>, count: usize)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        debug_assert!(count <= size);
        debug_assert_eq!(recipient.size(), 0);

        let start = Self::entry_offset(size - count);
        let end = Self::entry_offset(size);
        recipient.raw_mut()[NODE_HEADER_SIZE..NODE_HEADER_SIZE + (end - start)]
            .copy_from_slice(&self.raw()[start..end]);

        recipient.set_size(count);
        self.set_size(size - count);
    }

    /// Merge every entry into the left sibling `recipient` and hand over
    /// the next-leaf link.
    pub fn move_all_to<B2>(&mut self, recipient: &mut LeafNode<B2, K>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let recipient_size = recipient.size();
        debug_assert!(recipient_size + size <= recipient.max_size());

        let start = Self::entry_offset(0);
        let end = Self::entry_offset(size);
        let dest = Self::entry_offset(recipient_size);
        recipient.raw_mut()[dest..dest + (end - start)].copy_from_slice(&self.raw()[start..end]);

        recipient.set_size(recipient_size + size);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Shift this node's first entry onto the end of the left sibling
    /// `recipient`. Redistribution helper.
    pub fn move_first_to_end_of<B2>(&mut self, recipient: &mut LeafNode<B2, K>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let key = self.key_at(0);
        let rid = self.rid_at(0);

        let size = self.size();
        let start = Self::entry_offset(1);
        let end = Self::entry_offset(size);
        self.raw_mut().copy_within(start..end, Self::entry_offset(0));
        self.set_size(size - 1);

        let recipient_size = recipient.size();
        recipient.write_entry(recipient_size, &key, rid);
        recipient.set_size(recipient_size + 1);
    }

    /// Shift this node's last entry onto the front of the right sibling
    /// `recipient`.
    pub fn move_last_to_front_of<B2>(&mut self, recipient: &mut LeafNode<B2, K>)
    where
        B2: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let key = self.key_at(size - 1);
        let rid = self.rid_at(size - 1);
        self.set_size(size - 1);

        let recipient_size = recipient.size();
        let start = Self::entry_offset(0);
        let end = Self::entry_offset(recipient_size);
        recipient
            .raw_mut()
            .copy_within(start..end, start + Self::entry_size());
        recipient.write_entry(0, &key, rid);
        recipient.set_size(recipient_size + 1);
    }
}

impl<B: AsRef<[u8]>, K: IndexKey> NodeView for LeafNode<B, K> {
    fn raw(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: IndexKey> NodeViewMut for LeafNode<B, K> {
    fn raw_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}
