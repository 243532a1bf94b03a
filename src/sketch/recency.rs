//! Intrusive least-recently-touched list over the bit-table slots.
//!
//! The engine owns the slot storage; slots are linked in place through `u32`
//! index fields, so relinking never allocates. The list object itself holds
//! only the two end indices and the linked-slot count.

pub(crate) const NIL: u32 = u32::MAX;

/// One bit-table slot. `set` is the linear-counting bit, `gap` counts the
/// aged recency units this slot has absorbed from promoted successors.
pub(crate) struct Slot {
    pub(crate) set: bool,
    pub(crate) gap: u64,
    prev: u32,
    next: u32,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            set: false,
            gap: 0,
            prev: NIL,
            next: NIL,
        }
    }
}

/// Doubly linked list ordered least-recently-touched first.
///
/// All operations are O(1). A slot must be linked at most once; callers keep
/// that in sync with the slot's `set` bit.
pub(crate) struct RecencyList {
    head: u32,
    tail: u32,
    len: usize,
}

impl RecencyList {
    pub(crate) fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Number of linked slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// The least-recently-touched slot index, if any.
    pub(crate) fn front(&self) -> Option<u32> {
        if self.head == NIL {
            None
        } else {
            Some(self.head)
        }
    }

    /// The list predecessor of a linked slot; `None` when the slot is the
    /// front (its predecessor is the sentinel).
    pub(crate) fn prev_of(&self, slots: &[Slot], index: u32) -> Option<u32> {
        let p = slots[index as usize].prev;
        if p == NIL {
            None
        } else {
            Some(p)
        }
    }

    /// Link an unlinked slot at the most-recently-touched end.
    pub(crate) fn push_back(&mut self, slots: &mut [Slot], index: u32) {
        debug_assert!(slots[index as usize].prev == NIL && slots[index as usize].next == NIL);
        if self.tail == NIL {
            self.head = index;
        } else {
            slots[self.tail as usize].next = index;
            slots[index as usize].prev = self.tail;
        }
        slots[index as usize].next = NIL;
        self.tail = index;
        self.len += 1;
    }

    /// Relink a linked slot at the most-recently-touched end; no-op if it is
    /// already there.
    pub(crate) fn move_to_back(&mut self, slots: &mut [Slot], index: u32) {
        if self.tail == index {
            return;
        }
        let prev = slots[index as usize].prev;
        let next = slots[index as usize].next;
        if prev == NIL {
            self.head = next;
        } else {
            slots[prev as usize].next = next;
        }
        // index != tail, so it has a successor
        slots[next as usize].prev = prev;

        slots[self.tail as usize].next = index;
        slots[index as usize].prev = self.tail;
        slots[index as usize].next = NIL;
        self.tail = index;
    }

    /// Unlink and return the least-recently-touched slot.
    pub(crate) fn pop_front(&mut self, slots: &mut [Slot]) -> Option<u32> {
        if self.head == NIL {
            return None;
        }
        let index = self.head;
        let next = slots[index as usize].next;
        self.head = next;
        if next == NIL {
            self.tail = NIL;
        } else {
            slots[next as usize].prev = NIL;
        }
        slots[index as usize].prev = NIL;
        slots[index as usize].next = NIL;
        self.len -= 1;
        Some(index)
    }

    /// Walk the list front to back. Test support; ingest never iterates.
    #[cfg(test)]
    pub(crate) fn iter<'a>(&'a self, slots: &'a [Slot]) -> impl Iterator<Item = u32> + 'a {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            if cur == NIL {
                return None;
            }
            let out = cur;
            cur = slots[cur as usize].next;
            Some(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use proptest::{collection, prop_assert_eq, proptest, sample};

    use super::*;

    fn fresh(n: usize) -> Vec<Slot> {
        (0..n).map(|_| Slot::new()).collect()
    }

    #[test]
    fn push_touch_pop_order() {
        let mut slots = fresh(4);
        let mut list = RecencyList::new();
        list.push_back(&mut slots, 0);
        list.push_back(&mut slots, 1);
        list.push_back(&mut slots, 2);
        assert_eq!(list.iter(&slots).collect::<Vec<_>>(), vec![0, 1, 2]);

        list.move_to_back(&mut slots, 0);
        assert_eq!(list.iter(&slots).collect::<Vec<_>>(), vec![1, 2, 0]);

        // touching the tail changes nothing
        list.move_to_back(&mut slots, 0);
        assert_eq!(list.iter(&slots).collect::<Vec<_>>(), vec![1, 2, 0]);

        assert_eq!(list.pop_front(&mut slots), Some(1));
        assert_eq!(list.pop_front(&mut slots), Some(2));
        assert_eq!(list.pop_front(&mut slots), Some(0));
        assert_eq!(list.pop_front(&mut slots), None);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn prev_of_front_is_sentinel() {
        let mut slots = fresh(3);
        let mut list = RecencyList::new();
        list.push_back(&mut slots, 2);
        list.push_back(&mut slots, 1);
        assert_eq!(list.prev_of(&slots, 2), None);
        assert_eq!(list.prev_of(&slots, 1), Some(2));
    }

    #[test]
    fn relinked_after_pop() {
        let mut slots = fresh(2);
        let mut list = RecencyList::new();
        list.push_back(&mut slots, 0);
        assert_eq!(list.pop_front(&mut slots), Some(0));
        // popped slots are fully unlinked and may be pushed again
        list.push_back(&mut slots, 0);
        assert_eq!(list.iter(&slots).collect::<Vec<_>>(), vec![0]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(u32),
        Touch(u32),
        Pop,
    }

    fn op_strategy(n: u32) -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::strategy::Strategy;
        (0..3u8, sample::select((0..n).collect::<Vec<_>>())).prop_map(|(kind, idx)| match kind {
            0 => Op::Push(idx),
            1 => Op::Touch(idx),
            _ => Op::Pop,
        })
    }

    proptest! {
        #[test]
        fn matches_deque_model(ops in collection::vec(op_strategy(8), 0..200)) {
            let mut slots = fresh(8);
            let mut list = RecencyList::new();
            let mut model: VecDeque<u32> = VecDeque::new();
            for op in ops {
                match op {
                    Op::Push(i) if !model.contains(&i) => {
                        list.push_back(&mut slots, i);
                        model.push_back(i);
                    }
                    Op::Touch(i) if model.contains(&i) => {
                        list.move_to_back(&mut slots, i);
                        model.retain(|&x| x != i);
                        model.push_back(i);
                    }
                    Op::Pop => {
                        prop_assert_eq!(list.pop_front(&mut slots), model.pop_front());
                    }
                    _ => {}
                }
                prop_assert_eq!(list.len(), model.len());
                prop_assert_eq!(
                    list.iter(&slots).collect::<Vec<_>>(),
                    model.iter().copied().collect::<Vec<_>>()
                );
            }
        }
    }
}
