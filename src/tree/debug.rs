//! Debug utilities for checking tree invariants.

use std::fmt::{self, Write};

use super::{height, HashTree, Node};
use crate::hash::KeyHasher;

impl<K, V, H: KeyHasher<K>> HashTree<K, V, H> {
    /// Verify tree integrity - returns list of issues found.
    ///
    /// Checks stored heights, AVL balance, hash ordering, that every key
    /// hashes to its node, that conflict lists hold no duplicates, and that
    /// `len` matches the reachable pair count.
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut count = 0usize;
        if let Some(root) = self.root.as_deref() {
            self.verify_node(root, None, None, &mut count, &mut issues);
        }
        if count != self.len {
            issues.push(format!("len is {} but {} pairs are reachable", self.len, count));
        }
        issues
    }

    fn verify_node(
        &self,
        node: &Node<K, V>,
        lower: Option<i32>,
        upper: Option<i32>,
        count: &mut usize,
        issues: &mut Vec<String>,
    ) {
        let hash = node.hash;
        let (lh, rh) = (height(&node.left), height(&node.right));

        if node.height != 1 + lh.max(rh) {
            issues.push(format!(
                "node {hash} stores height {} but children give {}",
                node.height,
                1 + lh.max(rh)
            ));
        }
        if (lh - rh).abs() > 1 {
            issues.push(format!("node {hash} unbalanced: left {lh}, right {rh}"));
        }
        if lower.is_some_and(|lo| hash <= lo) || upper.is_some_and(|hi| hash >= hi) {
            issues.push(format!("node {hash} outside ({lower:?}, {upper:?})"));
        }
        if self.hasher.hash_of(&node.key) != hash {
            issues.push(format!("primary key of node {hash} hashes elsewhere"));
        }

        let conflicts = node.conflict_slice();
        if node.conflicts.is_some() && conflicts.is_empty() {
            issues.push(format!("node {hash} keeps an empty conflict list"));
        }
        for (i, (k, _)) in conflicts.iter().enumerate() {
            if self.hasher.hash_of(k) != hash {
                issues.push(format!("conflict {i} of node {hash} hashes elsewhere"));
            }
            if self.hasher.equal(k, &node.key) {
                issues.push(format!("conflict {i} of node {hash} duplicates the primary key"));
            }
            if conflicts[..i].iter().any(|(other, _)| self.hasher.equal(other, k)) {
                issues.push(format!("conflict {i} of node {hash} is duplicated"));
            }
        }
        *count += 1 + conflicts.len();

        if let Some(left) = node.left.as_deref() {
            self.verify_node(left, lower, Some(hash), count, issues);
        }
        if let Some(right) = node.right.as_deref() {
            self.verify_node(right, Some(hash), upper, count, issues);
        }
    }
}

impl<K: fmt::Debug, V, H> HashTree<K, V, H> {
    /// Render the tree sideways, one node per line, right subtree on top.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        match self.root.as_deref() {
            Some(root) => dump_node(root, 0, &mut out),
            None => out.push_str("(empty)\n"),
        }
        out
    }
}

fn dump_node<K: fmt::Debug, V>(node: &Node<K, V>, depth: usize, out: &mut String) {
    if let Some(right) = node.right.as_deref() {
        dump_node(right, depth + 1, out);
    }
    let indent = "    ".repeat(depth);
    let _ = write!(out, "{indent}{} {:?}", node.hash, node.key);
    let conflicts = node.conflict_slice();
    if !conflicts.is_empty() {
        let keys: Vec<&K> = conflicts.iter().map(|(k, _)| k).collect();
        let _ = write!(out, " +{keys:?}");
    }
    out.push('\n');
    if let Some(left) = node.left.as_deref() {
        dump_node(left, depth + 1, out);
    }
}
