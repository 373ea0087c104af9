//! A Binary Decision Tree is the core data structure for Bayesian Additive
//! Regression Trees (BART). The tree is implemented as an arena of nodes
//! addressed by stable integer indices.
//!
//! Two kinds of addresses are used throughout:
//! - an **index** is a slot in the arena. It stays valid for as long as the
//!   node is alive and is what traversals and routing hand back.
//! - a **node id** (`nid`) is the implicit binary-heap address of a node:
//!   the root is `1`, the left child of `n` is `2n` and the right child is
//!   `2n + 1`. Node ids are always computed from the parent links and never
//!   stored, so they cannot go stale across mutation.

use std::cmp::Ordering;
use std::ops::Index;

use log::debug;
use ndarray::{Array1, ArrayView2, Axis};

use crate::cutpoints::CutpointTable;
use crate::errors::TreeError;

/// Arena index of the root node. The root is never released.
pub const ROOT: usize = 0;

/// Deepest level a node can sit at. Node ids of deeper nodes would not fit
/// in a `usize`, so leaves at this depth cannot be split.
pub const MAX_DEPTH: usize = usize::BITS as usize - 1;

/// Structural role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// The node has no parent. A single-node tree's root is `Root`, not `Leaf`.
    Root,
    /// The node has no children.
    Leaf,
    /// The node has two children and both are leaves.
    NoGrandchildren,
    /// Any other internal node.
    Interior,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    value: f64,
    feature: usize,
    cutpoint: usize,
    parent: Option<usize>,
    children: Option<(usize, usize)>,
}

impl Node {
    fn leaf(value: f64, parent: Option<usize>) -> Self {
        Self {
            value,
            feature: 0,
            cutpoint: 0,
            parent,
            children: None,
        }
    }
}

/// One point of a tree evaluated over a two-feature cutpoint grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    /// The grid coordinates `(cutpoints[0][i], cutpoints[1][j])`.
    pub x: [f64; 2],
    /// Value of the leaf the point routes to.
    pub value: f64,
    /// Node id of that leaf.
    pub nid: usize,
}

/// A `DecisionTree` is an arena-based implementation of the binary decision tree.
///
/// Every node either has no children (a leaf, carrying the predictive value)
/// or exactly two. Internal nodes route a sample left when
/// `x[feature] < cutpoints[feature][cutpoint]` and right otherwise.
#[derive(Debug)]
pub struct DecisionTree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl DecisionTree {
    /// Creates a new `DecisionTree` consisting of a single root leaf.
    ///
    /// # Examples
    ///
    /// ```
    /// use bart_ensemble::tree::{DecisionTree, ROOT};
    ///
    /// let tree = DecisionTree::new(0.5);
    /// assert_eq!(tree.size(), 1);
    /// assert_eq!(tree.value(ROOT), 0.5);
    /// ```
    pub fn new(init_value: f64) -> Self {
        Self {
            nodes: vec![Some(Node::leaf(init_value, None))],
            free: Vec::new(),
        }
    }

    /// Resets the tree to a single root leaf with value `0.0`, releasing
    /// every other node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.nodes.push(Some(Node::leaf(0.0, None)));
    }

    #[inline(always)]
    fn at(&self, index: usize) -> &Node {
        match self.nodes.get(index) {
            Some(Some(node)) => node,
            _ => panic!("node index {} does not refer to a live node", index),
        }
    }

    #[inline(always)]
    fn at_mut(&mut self, index: usize) -> &mut Node {
        match self.nodes.get_mut(index) {
            Some(Some(node)) => node,
            _ => panic!("node index {} does not refer to a live node", index),
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                index
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        self.nodes[index] = None;
        self.free.push(index);
    }

    /// Checks whether `index` refers to a live node.
    pub fn is_live(&self, index: usize) -> bool {
        matches!(self.nodes.get(index), Some(Some(_)))
    }

    // --- Node accessors. All of them panic if `index` is not live. ---

    /// Leaf value of the node. Vestigial for internal nodes.
    #[inline]
    pub fn value(&self, index: usize) -> f64 {
        self.at(index).value
    }

    /// Overwrites the value stored at the node.
    pub fn set_value(&mut self, index: usize, value: f64) {
        self.at_mut(index).value = value;
    }

    /// Split feature of the node. Meaningless for leaves.
    #[inline]
    pub fn feature(&self, index: usize) -> usize {
        self.at(index).feature
    }

    /// Split cutpoint index of the node. Meaningless for leaves.
    #[inline]
    pub fn cutpoint(&self, index: usize) -> usize {
        self.at(index).cutpoint
    }

    /// Arena index of the parent, `None` for the root.
    #[inline]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.at(index).parent
    }

    /// Arena indices of the `(left, right)` children, `None` for a leaf.
    #[inline]
    pub fn children(&self, index: usize) -> Option<(usize, usize)> {
        self.at(index).children
    }

    /// Arena index of the left child.
    pub fn left_child(&self, index: usize) -> Option<usize> {
        self.children(index).map(|(left, _)| left)
    }

    /// Arena index of the right child.
    pub fn right_child(&self, index: usize) -> Option<usize> {
        self.children(index).map(|(_, right)| right)
    }

    /// Checks whether the node has no children.
    #[inline]
    pub fn is_leaf(&self, index: usize) -> bool {
        self.at(index).children.is_none()
    }

    /// Checks whether the node has children and neither of them has children.
    pub fn is_nog(&self, index: usize) -> bool {
        match self.at(index).children {
            Some((left, right)) => self.is_leaf(left) && self.is_leaf(right),
            None => false,
        }
    }

    /// Structural role of the node. The root is reported as `Root` even when
    /// it is also a leaf.
    pub fn node_type(&self, index: usize) -> NodeType {
        if self.parent(index).is_none() {
            NodeType::Root
        } else if self.is_leaf(index) {
            NodeType::Leaf
        } else if self.is_nog(index) {
            NodeType::NoGrandchildren
        } else {
            NodeType::Interior
        }
    }

    /// Computes the depth (number of ancestors) of _this_ node.
    pub fn node_depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut current = index;

        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }

        depth
    }

    /// Computes the node id of _this_ node from its ancestry.
    pub fn nid(&self, index: usize) -> usize {
        let mut path = 0usize;
        let mut depth = 0;
        let mut current = index;

        while let Some(parent) = self.parent(current) {
            if self.right_child(parent) == Some(current) {
                path |= 1usize << depth;
            }
            depth += 1;
            current = parent;
        }

        (1usize << depth) | path
    }

    /// Resolves a node id to an arena index by descending from the root
    /// along the bits of `nid`.
    pub fn index_of(&self, nid: usize) -> Option<usize> {
        if nid == 0 {
            return None;
        }

        let depth = (usize::BITS - 1 - nid.leading_zeros()) as usize;
        let mut current = ROOT;

        for level in (0..depth).rev() {
            let (left, right) = self.children(current)?;
            current = if (nid >> level) & 1 == 1 { right } else { left };
        }

        Some(current)
    }

    /// Arena indices of all nodes in depth-first preorder (node, left, right).
    pub fn nodes(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.size());
        let mut stack = vec![ROOT];

        while let Some(index) = stack.pop() {
            order.push(index);
            if let Some((left, right)) = self.children(index) {
                stack.push(right);
                stack.push(left);
            }
        }

        order
    }

    /// Arena indices of the leaves, left to right.
    pub fn leaves(&self) -> Vec<usize> {
        self.nodes()
            .into_iter()
            .filter(|&index| self.is_leaf(index))
            .collect()
    }

    /// Arena indices of the no-grandchildren nodes, left to right.
    pub fn nogs(&self) -> Vec<usize> {
        self.nodes()
            .into_iter()
            .filter(|&index| self.is_nog(index))
            .collect()
    }

    /// Number of nodes in the tree.
    #[inline]
    pub fn size(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|node| node.children.is_none())
            .count()
    }

    /// Number of internal nodes.
    pub fn n_internal(&self) -> usize {
        self.size() - self.n_leaves()
    }

    /// Number of no-grandchildren nodes.
    pub fn n_nogs(&self) -> usize {
        self.nogs().len()
    }

    /// Splits the leaf with node id `nid` into an internal node with two new
    /// leaves carrying `left_value` and `right_value`.
    ///
    /// Returns the arena indices of the new `(left, right)` children. The tree
    /// is unchanged on error.
    pub fn birth(
        &mut self,
        nid: usize,
        feature: usize,
        cutpoint: usize,
        left_value: f64,
        right_value: f64,
    ) -> Result<(usize, usize), TreeError> {
        let index = self.index_of(nid).ok_or_else(|| {
            debug!("birth rejected: node id {} not found", nid);
            TreeError::NodeNotFound(nid)
        })?;

        if !self.is_leaf(index) {
            debug!("birth rejected: node {} has children", nid);
            return Err(TreeError::NonLeafSplit(nid));
        }
        self.check_depth(index)?;

        Ok(self.grow_leaf(index, feature, cutpoint, left_value, right_value))
    }

    /// Same as [`DecisionTree::birth`], addressing the leaf by arena index.
    pub fn birth_at(
        &mut self,
        index: usize,
        feature: usize,
        cutpoint: usize,
        left_value: f64,
        right_value: f64,
    ) -> Result<(usize, usize), TreeError> {
        if !self.is_live(index) {
            return Err(TreeError::InvalidNodeIndex(index));
        }

        if !self.is_leaf(index) {
            debug!("birth rejected: node index {} has children", index);
            return Err(TreeError::NonLeafSplit(index));
        }
        self.check_depth(index)?;

        Ok(self.grow_leaf(index, feature, cutpoint, left_value, right_value))
    }

    /// Removes both children of the no-grandchildren node with id `nid`,
    /// turning it into a leaf carrying `value`. The tree is unchanged on error.
    pub fn death(&mut self, nid: usize, value: f64) -> Result<(), TreeError> {
        let index = self.index_of(nid).ok_or_else(|| {
            debug!("death rejected: node id {} not found", nid);
            TreeError::NodeNotFound(nid)
        })?;

        if !self.is_nog(index) {
            debug!("death rejected: node {} is not a nog node", nid);
            return Err(TreeError::NotNoGrandchildren(nid));
        }

        self.prune_nog(index, value);
        Ok(())
    }

    /// Same as [`DecisionTree::death`], addressing the node by arena index.
    pub fn death_at(&mut self, index: usize, value: f64) -> Result<(), TreeError> {
        if !self.is_live(index) {
            return Err(TreeError::InvalidNodeIndex(index));
        }

        if !self.is_nog(index) {
            debug!("death rejected: node index {} is not a nog node", index);
            return Err(TreeError::NotNoGrandchildren(index));
        }

        self.prune_nog(index, value);
        Ok(())
    }

    fn check_depth(&self, index: usize) -> Result<(), TreeError> {
        let depth = self.node_depth(index);
        if depth >= MAX_DEPTH {
            debug!("birth rejected: node index {} is at depth {}", index, depth);
            return Err(TreeError::DepthLimit {
                depth,
                max_depth: MAX_DEPTH,
            });
        }
        Ok(())
    }

    fn grow_leaf(
        &mut self,
        index: usize,
        feature: usize,
        cutpoint: usize,
        left_value: f64,
        right_value: f64,
    ) -> (usize, usize) {
        let left = self.alloc(Node::leaf(left_value, Some(index)));
        let right = self.alloc(Node::leaf(right_value, Some(index)));

        let node = self.at_mut(index);
        node.feature = feature;
        node.cutpoint = cutpoint;
        node.children = Some((left, right));

        (left, right)
    }

    fn prune_nog(&mut self, index: usize, value: f64) {
        if let Some((left, right)) = self.at(index).children {
            self.release(left);
            self.release(right);
        }

        let node = self.at_mut(index);
        node.children = None;
        node.feature = 0;
        node.cutpoint = 0;
        node.value = value;
    }

    /// Routes a sample from the root down to a leaf and returns the leaf's
    /// arena index.
    ///
    /// At each internal node the sample goes left iff
    /// `sample[feature] < cutpoints.value(feature, cutpoint)`. Values outside
    /// the cutpoint grid and NaN are not rejected; NaN always goes right.
    pub fn route<S>(&self, sample: &S, cutpoints: &CutpointTable) -> usize
    where
        S: Index<usize, Output = f64> + ?Sized,
    {
        let mut index = ROOT;
        loop {
            let node = self.at(index);
            let (left, right) = match node.children {
                Some(children) => children,
                None => return index,
            };

            let threshold = cutpoints.value(node.feature, node.cutpoint);
            index = match sample[node.feature].partial_cmp(&threshold) {
                Some(Ordering::Less) => left,
                _ => right,
            };
        }
    }

    /// Predicts the value for a given input sample.
    pub fn predict<S>(&self, sample: &S, cutpoints: &CutpointTable) -> f64
    where
        S: Index<usize, Output = f64> + ?Sized,
    {
        self.value(self.route(sample, cutpoints))
    }

    /// Predicts one value per row of `X`.
    #[allow(non_snake_case)]
    pub fn evaluate(&self, X: ArrayView2<f64>, cutpoints: &CutpointTable) -> Array1<f64> {
        let mut output = Array1::zeros(X.nrows());
        for (out, row) in output.iter_mut().zip(X.axis_iter(Axis(0))) {
            *out = self.predict(&row, cutpoints);
        }
        output
    }

    /// Writes one prediction per row of `X` into `output`.
    ///
    /// # Panics
    ///
    /// Panics if `output.len()` differs from the number of rows of `X`.
    #[allow(non_snake_case)]
    pub fn evaluate_into(&self, X: ArrayView2<f64>, cutpoints: &CutpointTable, output: &mut [f64]) {
        assert_eq!(
            output.len(),
            X.nrows(),
            "output buffer length must match the number of rows"
        );

        for (out, row) in output.iter_mut().zip(X.axis_iter(Axis(0))) {
            *out = self.predict(&row, cutpoints);
        }
    }

    /// Evaluates the tree at every point of a two-feature cutpoint grid,
    /// iterating the first feature in the outer loop.
    pub fn evaluate_grid(&self, cutpoints: &CutpointTable) -> Result<Vec<GridPoint>, TreeError> {
        if cutpoints.n_features() != 2 {
            return Err(TreeError::GridDimension(cutpoints.n_features()));
        }

        let mut grid = Vec::with_capacity(cutpoints.n_cutpoints(0) * cutpoints.n_cutpoints(1));
        for &x0 in cutpoints.cutpoints(0) {
            for &x1 in cutpoints.cutpoints(1) {
                let x = [x0, x1];
                let leaf = self.route(&x[..], cutpoints);
                grid.push(GridPoint {
                    x,
                    value: self.value(leaf),
                    nid: self.nid(leaf),
                });
            }
        }

        Ok(grid)
    }

    /// Copies `source` into this tree, which must hold no nodes. Walks the
    /// source with an explicit stack so deep trees do not recurse.
    fn copy_structure(&mut self, source: &DecisionTree) {
        let root = source.at(ROOT);
        self.nodes.push(Some(Node {
            parent: None,
            children: None,
            ..*root
        }));

        let mut stack = vec![(ROOT, ROOT)];
        while let Some((from, to)) = stack.pop() {
            if let Some((left, right)) = source.children(from) {
                let new_left = self.alloc(Node {
                    parent: Some(to),
                    children: None,
                    ..*source.at(left)
                });
                let new_right = self.alloc(Node {
                    parent: Some(to),
                    children: None,
                    ..*source.at(right)
                });
                self.at_mut(to).children = Some((new_left, new_right));

                stack.push((right, new_right));
                stack.push((left, new_left));
            }
        }
    }
}

impl Clone for DecisionTree {
    /// Structural deep copy. The copy is compacted: released arena slots of
    /// the source are not carried over.
    fn clone(&self) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(self.size()),
            free: Vec::new(),
        };
        tree.copy_structure(self);
        tree
    }

    fn clone_from(&mut self, source: &Self) {
        self.nodes.clear();
        self.free.clear();
        self.copy_structure(source);
    }
}

impl PartialEq for DecisionTree {
    /// Two trees are equal when they have the same shape, the same split at
    /// every internal node and the same value at every leaf. Arena layout,
    /// split fields of leaves and values of internal nodes are ignored.
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(ROOT, ROOT)];

        while let Some((a, b)) = stack.pop() {
            let (node_a, node_b) = (self.at(a), other.at(b));
            match (node_a.children, node_b.children) {
                (None, None) => {
                    if node_a.value != node_b.value {
                        return false;
                    }
                }
                (Some((a_left, a_right)), Some((b_left, b_right))) => {
                    if node_a.feature != node_b.feature || node_a.cutpoint != node_b.cutpoint {
                        return false;
                    }
                    stack.push((a_right, b_right));
                    stack.push((a_left, b_left));
                }
                _ => return false,
            }
        }

        true
    }
}
