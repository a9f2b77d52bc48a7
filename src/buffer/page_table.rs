use std::collections::HashMap;
use std::sync::Arc;

use crate::common::PageKey;
use crate::storage::Page;

pub type SlotId = usize;

/// Arena of cached pages. Slots are reused after removal; `index` maps a page
/// key to the slot currently holding it.
#[derive(Default)]
pub struct PageTable {
    slots: Vec<Option<Arc<Page>>>,
    free: Vec<SlotId>,
    index: HashMap<PageKey, SlotId>,
}

impl PageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, key: PageKey) -> Option<&Arc<Page>> {
        let slot = *self.index.get(&key)?;
        self.slots[slot].as_ref()
    }

    pub fn contains(&self, key: PageKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn insert(&mut self, page: Arc<Page>) -> SlotId {
        let key = page.key();
        if let Some(&slot) = self.index.get(&key) {
            self.slots[slot] = Some(page);
            return slot;
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(page);
                slot
            }
            None => {
                self.slots.push(Some(page));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        slot
    }

    pub fn remove(&mut self, key: PageKey) -> Option<Arc<Page>> {
        let slot = self.index.remove(&key)?;
        self.free.push(slot);
        self.slots[slot].take()
    }

    /// Cached pages in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Page>> {
        self.slots.iter().flatten()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FileId;

    fn page(no: usize) -> Arc<Page> {
        Arc::new(Page::new(PageKey::new(FileId(1), no), vec![0; 4]))
    }

    #[test]
    fn slots_are_recycled() {
        let mut table = PageTable::new();
        let a = table.insert(page(0));
        let b = table.insert(page(1));
        assert_ne!(a, b);

        assert!(table.remove(PageKey::new(FileId(1), 0)).is_some());
        assert!(table.get(PageKey::new(FileId(1), 0)).is_none());
        assert_eq!(table.insert(page(7)), a);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.iter().map(|p| p.page_no()).collect::<Vec<_>>(),
            vec![7, 1]
        );
    }
}
