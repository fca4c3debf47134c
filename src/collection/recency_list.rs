/// Links of a single slot. A slot is part of the list iff `linked` is set.
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<usize>,
    next: Option<usize>,
    linked: bool,
}

/// Doubly-linked recency list over the fixed slot indices of a collection.
///
/// The most recently used slot sits at the head, the least recently used one at the tail. Links
/// are stored by index, so the list never owns the entries it orders.
#[derive(Debug)]
pub(crate) struct RecencyList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    links: Vec<Link>,
}

impl RecencyList {
    pub(crate) fn with_capacity(capacity: usize) -> RecencyList {
        let mut links = Vec::with_capacity(capacity);
        links.resize_with(capacity, Link::default);
        RecencyList {
            head: None,
            tail: None,
            len: 0,
            links,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.links.get(index).is_some_and(|link| link.linked)
    }

    /// Moves a slot to the head of the list, linking it first if necessary.
    ///
    /// Returns `true` if the slot was not part of the list before.
    ///
    /// ## Panics
    /// This method doesn't do an index check. Out of bound accesses will panic.
    pub(crate) fn promote(&mut self, index: usize) -> bool {
        if self.head == Some(index) {
            return false;
        }

        let newly_linked = !self.links[index].linked;
        if !newly_linked {
            self.unlink(index);
        }

        // head                   tail
        //  |                      |
        // [index] <-> [old head] ... [..]
        let old_head = self.head;
        self.links[index] = Link {
            prev: None,
            next: old_head,
            linked: true,
        };

        match old_head {
            Some(old_head) => self.links[old_head].prev = Some(index),
            None => self.tail = Some(index),
        }

        self.head = Some(index);
        self.len += 1;

        newly_linked
    }

    /// Removes the least recently used slot from the list and returns its index.
    ///
    /// If the list is empty, [None] is returned.
    pub(crate) fn pop_back(&mut self) -> Option<usize> {
        let tail = self.tail?;
        self.unlink(tail);
        Some(tail)
    }

    /// Removes a slot from the list.
    ///
    /// Returns `false` if the slot was not part of the list.
    pub(crate) fn remove(&mut self, index: usize) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.unlink(index);
        true
    }

    /// Returns the linked slot indices from the most to the least recently used.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.head, |&index| self.links[index].next)
    }

    /// Returns the linked slot indices from the least to the most recently used.
    pub(crate) fn iter_back(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.tail, |&index| self.links[index].prev)
    }

    fn unlink(&mut self, index: usize) {
        let Link { prev, next, .. } = self.links[index];

        match prev {
            Some(prev) => self.links[prev].next = next,
            None => self.head = next,
        }

        match next {
            Some(next) => self.links[next].prev = prev,
            None => self.tail = prev,
        }

        self.links[index] = Link::default();
        self.len -= 1;
    }
}
