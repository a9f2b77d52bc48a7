use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FileId, PageKey, TransactionID};

struct PageState {
    data: Vec<u8>,
    dirty: bool,
    dirtier: Option<TransactionID>,
    // Content as of the last clean point; only replaced wholesale, never edited.
    before_image: Arc<[u8]>,
}

/// A cached copy of one page of a file store.
///
/// Content and dirty bookkeeping live behind a per-page latch, so mutating
/// one page never serializes behind the buffer pool's coordinating lock or
/// behind work on other pages.
pub struct Page {
    key: PageKey,
    state: Mutex<PageState>,
}

impl Page {
    pub fn new(key: PageKey, data: Vec<u8>) -> Self {
        let before_image = Arc::from(data.as_slice());
        Self {
            key,
            state: Mutex::new(PageState {
                data,
                dirty: false,
                dirtier: None,
                before_image,
            }),
        }
    }

    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn file_id(&self) -> FileId {
        self.key.file
    }

    pub fn page_no(&self) -> usize {
        self.key.page_no
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// The transaction that last dirtied this page, if it is dirty.
    pub fn dirtier(&self) -> Option<TransactionID> {
        let state = self.state.lock();
        if state.dirty {
            state.dirtier
        } else {
            None
        }
    }

    pub fn set_dirty(&self, tid: TransactionID, dirty: bool) {
        let mut state = self.state.lock();
        state.dirty = dirty;
        if dirty {
            state.dirtier = Some(tid);
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let state = self.state.lock();
        f(&state.data)
    }

    /// Mutates the page on behalf of `tid` and marks it dirty. The first write
    /// after a clean point snapshots the before-image.
    pub fn write<R>(&self, tid: TransactionID, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut state = self.state.lock();
        if !state.dirty {
            state.before_image = Arc::from(state.data.as_slice());
        }
        let result = f(&mut state.data);
        state.dirty = true;
        state.dirtier = Some(tid);
        result
    }

    pub fn data(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    pub fn before_image(&self) -> Arc<[u8]> {
        Arc::clone(&self.state.lock().before_image)
    }

    /// Makes the current content the new undo point.
    pub fn set_before_image(&self) {
        let mut state = self.state.lock();
        state.before_image = Arc::from(state.data.as_slice());
    }

    /// Records that the current content now matches the file store.
    pub(crate) fn mark_clean(&self) {
        let mut state = self.state.lock();
        state.before_image = Arc::from(state.data.as_slice());
        state.dirty = false;
        state.dirtier = None;
    }

    /// Overwrites the content with `data` and marks the page clean.
    pub(crate) fn restore(&self, data: &[u8]) {
        let mut state = self.state.lock();
        state.data.clear();
        state.data.extend_from_slice(data);
        state.before_image = Arc::from(data);
        state.dirty = false;
        state.dirtier = None;
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Page")
            .field("key", &self.key)
            .field("dirty", &state.dirty)
            .field("dirtier", &state.dirtier)
            .field("len", &state.data.len())
            .finish()
    }
}
