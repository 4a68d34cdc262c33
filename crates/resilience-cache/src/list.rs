//! A doubly-linked access-order list backed by an arena of slots.
//!
//! Used by [`crate::segment::CacheSegment`] to track recency of touch for
//! LRU eviction. Nodes live in a `Vec<Slot<T>>` and are addressed by
//! `usize` index rather than raw pointers or `Rc`/`RefCell`; a removed
//! slot's links are cleared and the index is pushed onto a free list for
//! reuse by a later insertion. The list itself is not internally
//! synchronized — the enclosing segment's mutex provides mutual exclusion.

pub(crate) type SlotIndex = usize;

struct Slot<T> {
    value: Option<T>,
    prev: Option<SlotIndex>,
    next: Option<SlotIndex>,
}

pub(crate) struct AccessOrderList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<SlotIndex>,
    head: Option<SlotIndex>,
    tail: Option<SlotIndex>,
    len: usize,
}

impl<T> AccessOrderList<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Borrows the value at `index` without changing its position, or
    /// `None` if that slot has since been removed.
    pub(crate) fn get(&self, index: SlotIndex) -> Option<&T> {
        self.slots.get(index).and_then(|slot| slot.value.as_ref())
    }

    /// Snapshots every present slot's index, head-to-tail, so a caller can
    /// walk the list while mutating it (e.g. removing hard-expired entries
    /// mid-sweep) without fighting the borrow checker.
    pub(crate) fn indices(&self) -> Vec<SlotIndex> {
        let mut out = Vec::with_capacity(self.len);
        let mut current = self.head;
        while let Some(index) = current {
            out.push(index);
            current = self.slots[index].next;
        }
        out
    }

    /// Inserts `value` at the head (most-recently-touched position),
    /// returning the index to address it by for future `move_to_head`/`remove`.
    pub(crate) fn add_to_head(&mut self, value: T) -> SlotIndex {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Slot {
                    value: Some(value),
                    prev: None,
                    next: None,
                };
                index
            }
            None => {
                self.slots.push(Slot {
                    value: Some(value),
                    prev: None,
                    next: None,
                });
                self.slots.len() - 1
            }
        };
        self.link_at_head(index);
        self.len += 1;
        index
    }

    /// Moves an already-present slot to the head. A no-op if it is already
    /// there.
    pub(crate) fn move_to_head(&mut self, index: SlotIndex) {
        if self.head == Some(index) {
            return;
        }
        self.unlink(index);
        self.link_at_head(index);
    }

    fn unlink(&mut self, index: SlotIndex) {
        let prev = self.slots[index].prev;
        let next = self.slots[index].next;
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[index].prev = None;
        self.slots[index].next = None;
    }

    fn link_at_head(&mut self, index: SlotIndex) {
        self.slots[index].prev = None;
        self.slots[index].next = self.head;
        if let Some(old_head) = self.head {
            self.slots[old_head].prev = Some(index);
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    /// Removes the slot at `index`, returning its value, or `None` if it
    /// had already been removed.
    pub(crate) fn remove(&mut self, index: SlotIndex) -> Option<T> {
        let value = self.slots[index].value.take()?;
        self.unlink(index);
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    /// Removes and returns the least-recently-touched entry, if any.
    pub(crate) fn remove_tail(&mut self) -> Option<(SlotIndex, T)> {
        let tail = self.tail?;
        self.remove(tail).map(|value| (tail, value))
    }

    /// Visits every present value head-to-tail (most- to
    /// least-recently-touched). The exact order only affects refresh
    /// enqueue order, not correctness.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&T)) {
        let mut current = self.head;
        while let Some(index) = current {
            if let Some(value) = &self.slots[index].value {
                f(value);
            }
            current = self.slots[index].next;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &AccessOrderList<i32>) -> Vec<i32> {
        let mut out = Vec::new();
        list.for_each(|v| out.push(*v));
        out
    }

    #[test]
    fn insertion_order_is_head_to_tail_most_recent_first() {
        let mut list = AccessOrderList::new();
        list.add_to_head(1);
        list.add_to_head(2);
        list.add_to_head(3);
        assert_eq!(collect(&list), vec![3, 2, 1]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn move_to_head_reorders_without_changing_membership() {
        let mut list = AccessOrderList::new();
        let i1 = list.add_to_head(1);
        let _i2 = list.add_to_head(2);
        let _i3 = list.add_to_head(3);
        list.move_to_head(i1);
        assert_eq!(collect(&list), vec![1, 3, 2]);
    }

    #[test]
    fn remove_tail_yields_least_recently_touched() {
        let mut list = AccessOrderList::new();
        list.add_to_head(1);
        list.add_to_head(2);
        list.add_to_head(3);
        let (_, tail_value) = list.remove_tail().unwrap();
        assert_eq!(tail_value, 1);
        assert_eq!(collect(&list), vec![3, 2]);
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut list = AccessOrderList::new();
        let i1 = list.add_to_head(1);
        list.remove(i1);
        let i2 = list.add_to_head(2);
        assert_eq!(i1, i2);
        assert_eq!(collect(&list), vec![2]);
    }

    #[test]
    fn clear_empties_the_list() {
        let mut list = AccessOrderList::new();
        list.add_to_head(1);
        list.add_to_head(2);
        list.clear();
        assert_eq!(list.len(), 0);
        assert_eq!(collect(&list), Vec::<i32>::new());
    }

    #[test]
    fn remove_is_idempotent_against_double_removal() {
        let mut list = AccessOrderList::new();
        let i1 = list.add_to_head(1);
        assert_eq!(list.remove(i1), Some(1));
        assert_eq!(list.remove(i1), None);
    }

    #[test]
    fn get_borrows_without_reordering() {
        let mut list = AccessOrderList::new();
        let i1 = list.add_to_head(1);
        list.add_to_head(2);
        assert_eq!(list.get(i1), Some(&1));
        assert_eq!(collect(&list), vec![2, 1]);
    }

    #[test]
    fn indices_are_snapshotted_head_to_tail() {
        let mut list = AccessOrderList::new();
        let i1 = list.add_to_head(1);
        let i2 = list.add_to_head(2);
        let i3 = list.add_to_head(3);
        assert_eq!(list.indices(), vec![i3, i2, i1]);
    }
}
