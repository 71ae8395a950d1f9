//! In-order traversal with an explicit stack.

use std::iter::FusedIterator;

use smallvec::SmallVec;

use super::Node;

/// Inline capacity of the traversal stack. An AVL tree of height 32 already
/// holds millions of nodes; deeper trees spill to the heap.
const INLINE_DEPTH: usize = 32;

/// Iterator over `(&K, &V)` pairs of a [`HashTree`](super::HashTree).
///
/// The stack never holds more nodes than the tree is high. The iterator
/// borrows one snapshot, so it is unaffected by later updates.
pub struct Iter<'a, K, V> {
    stack: SmallVec<[&'a Node<K, V>; INLINE_DEPTH]>,
    /// Node whose conflicts are being yielded, and the next conflict index.
    current: Option<(&'a Node<K, V>, usize)>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(super) fn new(root: Option<&'a Node<K, V>>, len: usize, height: i32) -> Self {
        let mut iter = Self {
            stack: SmallVec::with_capacity(usize::try_from(height).unwrap_or(0)),
            current: None,
            remaining: len,
        };
        iter.push_left_spine(root);
        iter
    }

    #[inline]
    fn push_left_spine(&mut self, mut link: Option<&'a Node<K, V>>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = node.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((node, i)) = self.current {
            if let Some((k, v)) = node.conflicts.as_deref().and_then(|c| c.get(i)) {
                self.current = Some((node, i + 1));
                self.remaining = self.remaining.saturating_sub(1);
                return Some((k, v));
            }
            self.current = None;
        }

        let node = self.stack.pop()?;
        self.push_left_spine(node.right.as_deref());
        self.current = Some((node, 0));
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over the keys of a [`HashTree`](super::HashTree).
pub struct Keys<'a, K, V> {
    pub(super) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// Iterator over the values of a [`HashTree`](super::HashTree).
pub struct Values<'a, K, V> {
    pub(super) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
