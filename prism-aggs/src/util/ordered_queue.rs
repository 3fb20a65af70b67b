use std::cmp::Ordering;

/// A capacity bounded min-heap that keeps the top `capacity` elements seen so far.
///
/// The comparator is in rank order: `Ordering::Greater` means the left element
/// ranks ahead of the right one. The head of the heap is the lowest ranked
/// element currently retained, and is the one evicted on overflow.
///
/// Elements that compare `Equal` are retained or evicted depending on the order
/// they were inserted in; no stable tie order is guaranteed. Callers that need a
/// deterministic ranking must make the comparator a total order, for example by
/// falling back to an ordinal.
pub struct OrderedQueue<T, F> {
    heap: Vec<T>,
    capacity: usize,
    cmp: F,
}

impl<T, F> OrderedQueue<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(capacity: usize, cmp: F) -> Self {
        Self {
            heap: Vec::with_capacity(capacity.min(1024)),
            capacity,
            cmp,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The lowest ranked retained element.
    pub fn top(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Inserts `value`, returning whatever fell out of the queue.
    ///
    /// Below capacity nothing is evicted. At capacity the new element replaces
    /// the current minimum only if it ranks strictly higher; otherwise the new
    /// element itself is handed back.
    pub fn insert_with_overflow(&mut self, value: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(value);
        }
        if self.heap.len() < self.capacity {
            self.heap.push(value);
            self.sift_up(self.heap.len() - 1);
            return None;
        }
        if (self.cmp)(&value, &self.heap[0]) == Ordering::Greater {
            let evicted = std::mem::replace(&mut self.heap[0], value);
            self.sift_down(0);
            Some(evicted)
        } else {
            Some(value)
        }
    }

    /// Removes and returns the lowest ranked element.
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let min = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        min
    }

    /// Drains the queue, best ranked element first.
    pub fn into_ranked_vec(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(value) = self.pop() {
            out.push(value);
        }
        out.reverse();
        out
    }

    /// Borrows the retained elements, best ranked first, leaving the queue intact.
    pub fn ranked(&self) -> Vec<&T> {
        let mut out: Vec<&T> = self.heap.iter().collect();
        out.sort_by(|a, b| (self.cmp)(b, a));
        out
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.cmp)(&self.heap[a], &self.heap[b]) == Ordering::Less
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.heap.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.less(right, left) {
                smallest = right;
            }
            if !self.less(smallest, idx) {
                break;
            }
            self.heap.swap(idx, smallest);
            idx = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pop_is_ascending() {
        let mut queue = OrderedQueue::new(10, |a: &i32, b: &i32| a.cmp(b));
        for v in [5, 1, 9, 3, 7] {
            assert!(queue.insert_with_overflow(v).is_none());
        }
        assert_eq!(queue.top(), Some(&1));
        let popped: Vec<i32> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(popped, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_overflow_evicts_minimum() {
        let mut queue = OrderedQueue::new(2, |a: &i32, b: &i32| a.cmp(b));
        assert_eq!(queue.insert_with_overflow(4), None);
        assert_eq!(queue.insert_with_overflow(6), None);
        assert_eq!(queue.insert_with_overflow(5), Some(4));
        assert_eq!(queue.insert_with_overflow(1), Some(1));
        assert_eq!(queue.ranked(), vec![&6, &5]);
        assert_eq!(queue.len(), queue.capacity());
        assert_eq!(queue.into_ranked_vec(), vec![6, 5]);
    }

    #[test]
    fn test_equal_to_minimum_is_rejected_at_capacity() {
        let mut queue = OrderedQueue::new(1, |a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0));
        queue.insert_with_overflow((3, 'a'));
        assert_eq!(queue.insert_with_overflow((3, 'b')), Some((3, 'b')));
        assert_eq!(queue.into_ranked_vec(), vec![(3, 'a')]);
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut queue = OrderedQueue::new(0, |a: &i32, b: &i32| a.cmp(b));
        assert_eq!(queue.insert_with_overflow(1), Some(1));
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_reversed_comparator_keeps_smallest() {
        let mut queue = OrderedQueue::new(3, |a: &u64, b: &u64| b.cmp(a));
        for v in [10, 2, 8, 4, 6] {
            queue.insert_with_overflow(v);
        }
        assert_eq!(queue.into_ranked_vec(), vec![2, 4, 6]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_keeps_exact_top_k(values in prop::collection::vec(any::<i64>(), 0..200), k in 0usize..40) {
            let mut queue = OrderedQueue::new(k, |a: &i64, b: &i64| a.cmp(b));
            for v in &values {
                queue.insert_with_overflow(*v);
            }
            prop_assert!(queue.len() <= k);

            let mut expected = values.clone();
            expected.sort_unstable_by(|a, b| b.cmp(a));
            expected.truncate(k);

            prop_assert_eq!(queue.into_ranked_vec(), expected);
        }
    }
}
