//! Persistent AVL tree keyed by a signed 32-bit hash.
//!
//! Every node stores one primary key/value pair. Keys whose hash collides with
//! the primary key live in the node's conflict list. Updates never touch a
//! published node: they rebuild the path from the root to the change and share
//! every other subtree with the previous tree, so a [`HashTree`] is a cheap,
//! immutable snapshot that any number of threads may read without locks.
//!
//! Balancing follows the textbook AVL rules: after each structural change the
//! rebuilt ancestors are checked bottom-up and rotated when their subtree
//! heights differ by two.

mod debug;
mod iter;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::hash::{FxKeys, IdentityKeys, KeyHasher};

pub use iter::{Iter, Keys, Values};

// =============================================================================
// Nodes
// =============================================================================

/// Child reference. `None` is the shared zero-height empty leaf.
pub(crate) type Link<K, V> = Option<Arc<Node<K, V>>>;

pub(crate) struct Node<K, V> {
    pub(crate) hash: i32,
    pub(crate) key: K,
    pub(crate) value: V,
    /// Other keys with the same `hash`. Never holds `key`, never holds a key twice.
    pub(crate) conflicts: Option<Arc<[(K, V)]>>,
    pub(crate) left: Link<K, V>,
    pub(crate) right: Link<K, V>,
    pub(crate) height: i32,
}

#[inline]
pub(crate) fn height<K, V>(link: &Link<K, V>) -> i32 {
    link.as_ref().map_or(0, |n| n.height)
}

impl<K, V> Node<K, V> {
    #[inline]
    fn new(
        hash: i32,
        key: K,
        value: V,
        conflicts: Option<Arc<[(K, V)]>>,
        left: Link<K, V>,
        right: Link<K, V>,
    ) -> Arc<Self> {
        let height = 1 + height(&left).max(height(&right));
        Arc::new(Self {
            hash,
            key,
            value,
            conflicts,
            left,
            right,
            height,
        })
    }

    #[inline]
    fn conflict_slice(&self) -> &[(K, V)] {
        self.conflicts.as_deref().unwrap_or(&[])
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Copy of this node's payload over new children. Does not rebalance.
    #[inline]
    fn with_children(&self, left: Link<K, V>, right: Link<K, V>) -> Arc<Self> {
        Self::new(
            self.hash,
            self.key.clone(),
            self.value.clone(),
            self.conflicts.clone(),
            left,
            right,
        )
    }

    #[inline]
    fn with_value(&self, value: V) -> Arc<Self> {
        Self::new(
            self.hash,
            self.key.clone(),
            value,
            self.conflicts.clone(),
            self.left.clone(),
            self.right.clone(),
        )
    }

    #[inline]
    fn with_conflicts(&self, conflicts: Vec<(K, V)>) -> Arc<Self> {
        Self::new(
            self.hash,
            self.key.clone(),
            self.value.clone(),
            if conflicts.is_empty() {
                None
            } else {
                Some(Arc::from(conflicts))
            },
            self.left.clone(),
            self.right.clone(),
        )
    }

    /// Copy of this node's payload over new children, rebalanced.
    #[inline]
    fn rebuild(&self, left: Link<K, V>, right: Link<K, V>) -> Arc<Self> {
        balanced(
            self.hash,
            self.key.clone(),
            self.value.clone(),
            self.conflicts.clone(),
            left,
            right,
        )
    }
}

/// Build a node from its parts, rotating once (or twice) if the children
/// differ in height by two or more.
fn balanced<K: Clone, V: Clone>(
    hash: i32,
    key: K,
    value: V,
    conflicts: Option<Arc<[(K, V)]>>,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let delta = height(&left) - height(&right);
    if delta >= 2 {
        if let Some(l) = &left {
            if height(&l.right) > height(&l.left) {
                if let Some(lr) = &l.right {
                    // Left-right: lr becomes the subtree root.
                    let new_left = l.with_children(l.left.clone(), lr.left.clone());
                    let new_right = Node::new(hash, key, value, conflicts, lr.right.clone(), right);
                    return lr.with_children(Some(new_left), Some(new_right));
                }
            }
            let new_right = Node::new(hash, key, value, conflicts, l.right.clone(), right);
            return l.with_children(l.left.clone(), Some(new_right));
        }
    } else if delta <= -2 {
        if let Some(r) = &right {
            if height(&r.left) > height(&r.right) {
                if let Some(rl) = &r.left {
                    // Right-left: rl becomes the subtree root.
                    let new_left = Node::new(hash, key, value, conflicts, left, rl.left.clone());
                    let new_right = r.with_children(rl.right.clone(), r.right.clone());
                    return rl.with_children(Some(new_left), Some(new_right));
                }
            }
            let new_left = Node::new(hash, key, value, conflicts, left, r.left.clone());
            return r.with_children(Some(new_left), r.right.clone());
        }
    }
    Node::new(hash, key, value, conflicts, left, right)
}

// =============================================================================
// Insert / update
// =============================================================================

enum Change<K, V> {
    /// Nothing to do; the caller keeps its existing link.
    Unchanged,
    /// Rebuilt subtree. `added` is set when a new key was stored.
    Changed { node: Arc<Node<K, V>>, added: bool },
}

/// Shared insert path for every add/update flavour.
///
/// `on_existing` receives the stored key and value plus the incoming value and
/// returns the value to store, or `None` to keep the tree as it is. When
/// `insert_missing` is false an absent key leaves the tree unchanged.
fn upsert<K, V, H, F>(
    link: &Link<K, V>,
    hasher: &H,
    hash: i32,
    key: K,
    value: V,
    on_existing: F,
    insert_missing: bool,
) -> Change<K, V>
where
    K: Clone,
    V: Clone,
    H: KeyHasher<K>,
    F: FnOnce(&K, &V, V) -> Option<V>,
{
    let node = match link {
        None if insert_missing => {
            return Change::Changed {
                node: Node::new(hash, key, value, None, None, None),
                added: true,
            }
        }
        None => return Change::Unchanged,
        Some(node) => node,
    };

    match hash.cmp(&node.hash) {
        Ordering::Less => {
            match upsert(&node.left, hasher, hash, key, value, on_existing, insert_missing) {
                Change::Unchanged => Change::Unchanged,
                Change::Changed { node: left, added } => Change::Changed {
                    node: node.rebuild(Some(left), node.right.clone()),
                    added,
                },
            }
        }
        Ordering::Greater => {
            match upsert(&node.right, hasher, hash, key, value, on_existing, insert_missing) {
                Change::Unchanged => Change::Unchanged,
                Change::Changed { node: right, added } => Change::Changed {
                    node: node.rebuild(node.left.clone(), Some(right)),
                    added,
                },
            }
        }
        Ordering::Equal => {
            if hasher.equal(&node.key, &key) {
                return match on_existing(&node.key, &node.value, value) {
                    Some(value) => Change::Changed {
                        node: node.with_value(value),
                        added: false,
                    },
                    None => Change::Unchanged,
                };
            }

            let conflicts = node.conflict_slice();
            if let Some(i) = conflicts.iter().position(|(k, _)| hasher.equal(k, &key)) {
                let (old_key, old_value) = &conflicts[i];
                return match on_existing(old_key, old_value, value) {
                    Some(value) => {
                        let mut updated = conflicts.to_vec();
                        updated[i].1 = value;
                        Change::Changed {
                            node: node.with_conflicts(updated),
                            added: false,
                        }
                    }
                    None => Change::Unchanged,
                };
            }

            if !insert_missing {
                return Change::Unchanged;
            }
            let mut extended = Vec::with_capacity(conflicts.len() + 1);
            extended.extend_from_slice(conflicts);
            extended.push((key, value));
            Change::Changed {
                node: node.with_conflicts(extended),
                added: true,
            }
        }
    }
}

// =============================================================================
// Remove
// =============================================================================

/// Returns `None` when the key is absent, otherwise the rebuilt subtree.
fn remove<K, V, H>(link: &Link<K, V>, hasher: &H, hash: i32, key: &K) -> Option<Link<K, V>>
where
    K: Clone,
    V: Clone,
    H: KeyHasher<K>,
{
    let node = link.as_ref()?;
    match hash.cmp(&node.hash) {
        Ordering::Less => {
            let left = remove(&node.left, hasher, hash, key)?;
            Some(Some(node.rebuild(left, node.right.clone())))
        }
        Ordering::Greater => {
            let right = remove(&node.right, hasher, hash, key)?;
            Some(Some(node.rebuild(node.left.clone(), right)))
        }
        Ordering::Equal => {
            let conflicts = node.conflict_slice();
            if hasher.equal(&node.key, key) {
                // Drain conflicts before dropping the node itself.
                if let Some(((next_key, next_value), rest)) = conflicts.split_first() {
                    let rest = if rest.is_empty() {
                        None
                    } else {
                        Some(Arc::from(rest.to_vec()))
                    };
                    return Some(Some(Node::new(
                        node.hash,
                        next_key.clone(),
                        next_value.clone(),
                        rest,
                        node.left.clone(),
                        node.right.clone(),
                    )));
                }
                return Some(remove_node(node));
            }

            let i = conflicts.iter().position(|(k, _)| hasher.equal(k, key))?;
            let rest: Vec<(K, V)> = conflicts
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, kv)| kv.clone())
                .collect();
            Some(Some(node.with_conflicts(rest)))
        }
    }
}

/// Unlink `node`, replacing it with its in-order successor when it has two children.
fn remove_node<K: Clone, V: Clone>(node: &Node<K, V>) -> Link<K, V> {
    match (&node.left, &node.right) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(Arc::clone(only)),
        (Some(_), Some(right)) => {
            let successor = leftmost(right);
            Some(balanced(
                successor.hash,
                successor.key.clone(),
                successor.value.clone(),
                successor.conflicts.clone(),
                node.left.clone(),
                remove_leftmost(right),
            ))
        }
    }
}

fn leftmost<K, V>(mut node: &Arc<Node<K, V>>) -> &Arc<Node<K, V>> {
    while let Some(left) = &node.left {
        node = left;
    }
    node
}

fn remove_leftmost<K: Clone, V: Clone>(node: &Node<K, V>) -> Link<K, V> {
    match &node.left {
        None => node.right.clone(),
        Some(left) => Some(node.rebuild(remove_leftmost(left), node.right.clone())),
    }
}

// =============================================================================
// HashTree
// =============================================================================

/// An immutable, structurally shared map ordered by key hash.
///
/// All "mutating" operations take `&self` and return a new tree; the original
/// stays valid and unchanged. Cloning is O(1).
///
/// # Example
///
/// ```rust
/// use snaptree::HashTree;
///
/// let empty: HashTree<&str, u32> = HashTree::new();
/// let one = empty.add_or_update("a", 1);
/// let two = one.add_or_update("b", 2);
///
/// assert_eq!(one.get(&"b"), None);
/// assert_eq!(two.get(&"a"), Some(&1));
/// assert_eq!(two.len(), 2);
/// ```
pub struct HashTree<K, V, H = FxKeys> {
    root: Link<K, V>,
    len: usize,
    hasher: H,
}

/// Tree whose `i32` keys are their own hashes.
pub type IntTree<V> = HashTree<i32, V, IdentityKeys>;

impl<K, V, H: Default> HashTree<K, V, H> {
    /// The empty tree.
    pub fn new() -> Self {
        Self::with_hasher(H::default())
    }

    /// The empty tree. Allocation-free; every empty tree shares the same
    /// zero-height sentinel.
    pub fn empty() -> Self {
        Self::new()
    }
}

impl<K, V, H> HashTree<K, V, H> {
    /// The empty tree using the given hasher.
    pub const fn with_hasher(hasher: H) -> Self {
        Self {
            root: None,
            len: 0,
            hasher,
        }
    }

    /// Number of key/value pairs, conflicts included.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the tree holds no pairs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Height of the root; 0 for the empty tree.
    #[inline]
    pub fn height(&self) -> i32 {
        height(&self.root)
    }

    /// The tree's hasher.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// In-order iterator: ascending signed hash, each node's primary pair
    /// followed by its conflicts.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.root.as_deref(), self.len, self.height())
    }

    /// Iterator over keys in [`iter`](Self::iter) order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Iterator over values in [`iter`](Self::iter) order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// `true` if both trees share the same root allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn root(&self) -> Option<&Node<K, V>> {
        self.root.as_deref()
    }
}

impl<K, V, H: KeyHasher<K>> HashTree<K, V, H> {
    /// Look up `key`, first by hash, then by key equality within the bucket.
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hasher.hash_of(key);
        let node = self.find(hash)?;
        if self.hasher.equal(&node.key, key) {
            return Some(&node.value);
        }
        node.conflict_slice()
            .iter()
            .find(|(k, _)| self.hasher.equal(k, key))
            .map(|(_, v)| v)
    }

    /// Look up `key`, falling back to `default` when absent.
    #[inline]
    pub fn get_or<'a>(&'a self, key: &K, default: &'a V) -> &'a V {
        self.get(key).unwrap_or(default)
    }

    /// `true` if `key` is present.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Primary value stored under `hash`, without any key comparison.
    ///
    /// Meant for trees whose hash is the key itself, such as [`IntTree`].
    pub fn get_by_hash(&self, hash: i32) -> Option<&V> {
        self.find(hash).map(|n| &n.value)
    }

    fn find(&self, hash: i32) -> Option<&Node<K, V>> {
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            cur = match hash.cmp(&node.hash) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(node),
            };
        }
        None
    }
}

impl<K, V, H> HashTree<K, V, H>
where
    K: Clone,
    V: Clone,
    H: KeyHasher<K> + Clone,
{
    /// Store `value` under `key`, replacing any previous value.
    pub fn add_or_update(&self, key: K, value: V) -> Self {
        self.upsert(key, value, |_, _, new| Some(new), true)
    }

    /// Store `value` under `key`. If the key is present, store
    /// `merge(key, old, value)` instead. The merge applies equally to primary
    /// and conflicting keys.
    pub fn add_or_update_with<F>(&self, key: K, value: V, merge: F) -> Self
    where
        F: FnOnce(&K, &V, V) -> V,
    {
        self.upsert(key, value, |k, old, new| Some(merge(k, old, new)), true)
    }

    /// Store `value` only if `key` is absent. Returns a tree sharing this root
    /// when the key already exists.
    pub fn add_or_keep(&self, key: K, value: V) -> Self {
        self.upsert(key, value, |_, _, _| None, true)
    }

    /// Replace the value of an existing `key`. Absent keys leave the tree unchanged.
    pub fn update(&self, key: K, value: V) -> Self {
        self.upsert(key, value, |_, _, new| Some(new), false)
    }

    /// Remove `key`. Removing an absent key returns a tree sharing this root.
    pub fn remove(&self, key: &K) -> Self {
        let hash = self.hasher.hash_of(key);
        match remove(&self.root, &self.hasher, hash, key) {
            Some(root) => Self {
                root,
                len: self.len - 1,
                hasher: self.hasher.clone(),
            },
            None => self.clone(),
        }
    }

    fn upsert<F>(&self, key: K, value: V, on_existing: F, insert_missing: bool) -> Self
    where
        F: FnOnce(&K, &V, V) -> Option<V>,
    {
        let hash = self.hasher.hash_of(&key);
        match upsert(
            &self.root,
            &self.hasher,
            hash,
            key,
            value,
            on_existing,
            insert_missing,
        ) {
            Change::Unchanged => self.clone(),
            Change::Changed { node, added } => Self {
                root: Some(node),
                len: self.len + usize::from(added),
                hasher: self.hasher.clone(),
            },
        }
    }
}

impl<K, V, H: Clone> Clone for HashTree<K, V, H> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
            hasher: self.hasher.clone(),
        }
    }
}

impl<K, V, H: Default> Default for HashTree<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for HashTree<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, H> FromIterator<(K, V)> for HashTree<K, V, H>
where
    K: Clone,
    V: Clone,
    H: KeyHasher<K> + Clone + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |tree, (k, v)| tree.add_or_update(k, v))
    }
}

impl<'a, K, V, H> IntoIterator for &'a HashTree<K, V, H> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
