//! Dynamic AABB tree over opaque payload handles.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. Freed slots are
//! chained through `next_free`; a slot whose parent index equals its own
//! index is free. Leaves are fattened by a fixed margin so small motions do
//! not touch the tree, and moving leaves are additionally stretched along
//! their displacement.

use glam::Vec3;
use log::debug;

use crate::{
    config::{BVH_DISPLACEMENT_MULTIPLIER, BVH_MARGIN, BVH_STACK_DEPTH},
    core::aabb::Aabb,
};

const MIN_NODE_CAPACITY: usize = 16;

/// Index of a node in an [`AabbTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const NULL: NodeId = NodeId(u32::MAX);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::NULL
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    bounds: Aabb,
    parent: NodeId,
    left: NodeId,
    right: NodeId,
    next_free: NodeId,
    data: Option<T>,
}

impl<T> Node<T> {
    fn is_leaf(&self) -> bool {
        self.left.is_null()
    }
}

/// Bounding volume hierarchy of fattened boxes mapping to `T` payloads.
///
/// The payload is a weak reference (an id or handle); the tree never owns
/// whatever it points at.
#[derive(Debug, Clone)]
pub struct AabbTree<T> {
    nodes: Vec<Node<T>>,
    root: NodeId,
    free_list: NodeId,
    leaf_count: usize,
    margin: f32,
    displacement_multiplier: f32,
    rebuild_scratch: Vec<NodeId>,
    partner_scratch: Vec<(usize, f32)>,
}

impl<T: Copy> Default for AabbTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> AabbTree<T> {
    pub fn new() -> Self {
        Self::with_capacity(0, BVH_MARGIN, BVH_DISPLACEMENT_MULTIPLIER)
    }

    /// Pre-sizes the arena for `leaf_capacity` leaves (2n - 1 nodes).
    pub fn with_capacity(leaf_capacity: usize, margin: f32, displacement_multiplier: f32) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId::NULL,
            free_list: NodeId::NULL,
            leaf_count: 0,
            margin,
            displacement_multiplier,
            rebuild_scratch: Vec::new(),
            partner_scratch: Vec::new(),
        };
        if leaf_capacity > 0 {
            tree.grow_to(leaf_capacity * 2 - 1);
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn root_bounds(&self) -> Option<Aabb> {
        self.node(self.root).map(|node| node.bounds)
    }

    pub fn fat_bounds(&self, id: NodeId) -> Option<Aabb> {
        self.node(id).map(|node| node.bounds)
    }

    pub fn node_data(&self, id: NodeId) -> Option<T> {
        self.node(id).and_then(|node| node.data)
    }

    pub fn set_node_data(&mut self, id: NodeId, data: T) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            if node.is_leaf() && node.parent != id {
                node.data = Some(data);
            }
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node<T>> {
        if id.is_null() {
            return None;
        }
        self.nodes.get(id.index()).filter(|node| node.parent != id)
    }

    /// Allocates a leaf for `bounds` (fattened by the margin) and inserts it.
    pub fn create_node(&mut self, bounds: Aabb, data: T) -> NodeId {
        let id = self.allocate_node();
        {
            let node = &mut self.nodes[id.index()];
            node.bounds = bounds.expanded(self.margin);
            node.data = Some(data);
        }
        self.insert_leaf_node(id);
        self.leaf_count += 1;
        id
    }

    /// Removes and frees a leaf created by [`create_node`](Self::create_node).
    pub fn remove_node(&mut self, id: NodeId) {
        if self.node(id).is_none() {
            return;
        }
        self.remove_leaf_node(id, true);
        self.leaf_count -= 1;
    }

    /// Updates a leaf for new tight `bounds`. Returns `false` when the
    /// current fattened bounds still contain them and nothing changed.
    pub fn move_node(&mut self, id: NodeId, bounds: Aabb, displacement: Vec3) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.bounds.contains(&bounds) {
            return false;
        }

        self.remove_leaf_node(id, false);
        let fat = bounds
            .extended_along(displacement * self.displacement_multiplier)
            .expanded(self.margin);
        self.nodes[id.index()].bounds = fat;
        self.insert_leaf_node(id);
        true
    }

    fn grow_to(&mut self, capacity: usize) {
        let old = self.nodes.len();
        if capacity <= old {
            return;
        }
        self.nodes.reserve_exact(capacity - old);
        for index in old..capacity {
            let id = NodeId(index as u32);
            let next_free = if index + 1 < capacity {
                NodeId(index as u32 + 1)
            } else {
                self.free_list
            };
            self.nodes.push(Node {
                bounds: Aabb::default(),
                parent: id,
                left: NodeId::NULL,
                right: NodeId::NULL,
                next_free,
                data: None,
            });
        }
        self.free_list = NodeId(old as u32);
    }

    fn allocate_node(&mut self) -> NodeId {
        if self.free_list.is_null() {
            let capacity = (self.nodes.len() * 2).max(MIN_NODE_CAPACITY);
            self.grow_to(capacity);
        }
        let id = self.free_list;
        let node = &mut self.nodes[id.index()];
        self.free_list = node.next_free;
        node.parent = NodeId::NULL;
        node.left = NodeId::NULL;
        node.right = NodeId::NULL;
        node.next_free = NodeId::NULL;
        node.data = None;
        id
    }

    fn free_node(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.index()];
        node.parent = id;
        node.left = NodeId::NULL;
        node.right = NodeId::NULL;
        node.data = None;
        node.next_free = self.free_list;
        self.free_list = id;
    }

    /// Finds the sibling minimizing the surface area added by pairing it
    /// with a leaf of `bounds`, pruning subtrees by their lower-bound cost.
    fn find_best_sibling(&self, bounds: &Aabb) -> NodeId {
        let leaf_area = bounds.surface_area();
        let mut best = self.root;
        let mut best_cost = self.nodes[self.root.index()].bounds.union(bounds).surface_area();

        let mut stack = [(NodeId::NULL, 0.0_f32); BVH_STACK_DEPTH];
        stack[0] = (self.root, 0.0);
        let mut top = 1;

        while top > 0 {
            top -= 1;
            let (index, inherited) = stack[top];
            let node = &self.nodes[index.index()];

            let direct = node.bounds.union(bounds).surface_area();
            let cost = direct + inherited;
            if cost < best_cost {
                best_cost = cost;
                best = index;
            }

            if node.is_leaf() {
                continue;
            }

            let child_inherited = inherited + direct - node.bounds.surface_area();
            let lower_bound = leaf_area + child_inherited;
            if lower_bound < best_cost && top + 2 <= BVH_STACK_DEPTH {
                stack[top] = (node.left, child_inherited);
                stack[top + 1] = (node.right, child_inherited);
                top += 2;
            }
        }

        best
    }

    fn insert_leaf_node(&mut self, leaf: NodeId) {
        if self.root.is_null() {
            self.root = leaf;
            self.nodes[leaf.index()].parent = NodeId::NULL;
            return;
        }

        let leaf_bounds = self.nodes[leaf.index()].bounds;
        let sibling = self.find_best_sibling(&leaf_bounds);
        let old_parent = self.nodes[sibling.index()].parent;

        let new_parent = self.allocate_node();
        {
            let sibling_bounds = self.nodes[sibling.index()].bounds;
            let node = &mut self.nodes[new_parent.index()];
            node.parent = old_parent;
            node.bounds = leaf_bounds.union(&sibling_bounds);
            node.left = sibling;
            node.right = leaf;
        }
        self.nodes[sibling.index()].parent = new_parent;
        self.nodes[leaf.index()].parent = new_parent;

        if old_parent.is_null() {
            self.root = new_parent;
        } else {
            self.replace_child(old_parent, sibling, new_parent);
        }

        self.refit_upward(old_parent);
    }

    /// Detaches `leaf`, promoting its sibling into the parent's place.
    fn remove_leaf_node(&mut self, leaf: NodeId, free: bool) {
        debug_assert!(
            self.nodes[leaf.index()].is_leaf(),
            "remove_leaf_node called with an internal node"
        );

        if leaf == self.root {
            self.root = NodeId::NULL;
        } else {
            let parent = self.nodes[leaf.index()].parent;
            let grand_parent = self.nodes[parent.index()].parent;
            let sibling = {
                let node = &self.nodes[parent.index()];
                if node.left == leaf {
                    node.right
                } else {
                    node.left
                }
            };

            if grand_parent.is_null() {
                self.root = sibling;
                self.nodes[sibling.index()].parent = NodeId::NULL;
            } else {
                self.replace_child(grand_parent, parent, sibling);
                self.nodes[sibling.index()].parent = grand_parent;
                self.refit_upward(grand_parent);
            }
            self.free_node(parent);
        }

        if free {
            self.free_node(leaf);
        } else {
            self.nodes[leaf.index()].parent = NodeId::NULL;
        }
    }

    fn replace_child(&mut self, parent: NodeId, old_child: NodeId, new_child: NodeId) {
        let node = &mut self.nodes[parent.index()];
        if node.left == old_child {
            node.left = new_child;
        } else {
            node.right = new_child;
        }
    }

    fn refit_upward(&mut self, start: NodeId) {
        let mut index = start;
        while !index.is_null() {
            let (left, right) = {
                let node = &self.nodes[index.index()];
                (node.left, node.right)
            };
            let bounds = self.nodes[left.index()]
                .bounds
                .union(&self.nodes[right.index()].bounds);
            self.nodes[index.index()].bounds = bounds;
            self.rotate_node(index);
            index = self.nodes[index.index()].parent;
        }
    }

    /// Tries the four single swaps between a child and a grandchild of
    /// `index` and applies the one that shrinks surface area the most.
    fn rotate_node(&mut self, index: NodeId) {
        #[derive(Clone, Copy)]
        enum Rotation {
            None,
            BF,
            BG,
            CD,
            CE,
        }

        let a = &self.nodes[index.index()];
        if a.is_leaf() {
            return;
        }
        let b = a.left;
        let c = a.right;
        let b_node = &self.nodes[b.index()];
        let c_node = &self.nodes[c.index()];

        let mut best = Rotation::None;
        let mut best_delta = 0.0_f32;

        if !c_node.is_leaf() {
            let area_c = c_node.bounds.surface_area();
            let f = &self.nodes[c_node.left.index()];
            let g = &self.nodes[c_node.right.index()];

            let delta = b_node.bounds.union(&g.bounds).surface_area() - area_c;
            if delta < best_delta {
                best_delta = delta;
                best = Rotation::BF;
            }
            let delta = f.bounds.union(&b_node.bounds).surface_area() - area_c;
            if delta < best_delta {
                best_delta = delta;
                best = Rotation::BG;
            }
        }

        if !b_node.is_leaf() {
            let area_b = b_node.bounds.surface_area();
            let d = &self.nodes[b_node.left.index()];
            let e = &self.nodes[b_node.right.index()];

            let delta = c_node.bounds.union(&e.bounds).surface_area() - area_b;
            if delta < best_delta {
                best_delta = delta;
                best = Rotation::CD;
            }
            let delta = d.bounds.union(&c_node.bounds).surface_area() - area_b;
            if delta < best_delta {
                best = Rotation::CE;
            }
        }

        match best {
            Rotation::None => {}
            Rotation::BF => {
                let f = self.nodes[c.index()].left;
                let g = self.nodes[c.index()].right;
                self.nodes[index.index()].left = f;
                self.nodes[f.index()].parent = index;
                self.nodes[c.index()].left = b;
                self.nodes[b.index()].parent = c;
                self.nodes[c.index()].bounds =
                    self.nodes[b.index()].bounds.union(&self.nodes[g.index()].bounds);
            }
            Rotation::BG => {
                let f = self.nodes[c.index()].left;
                let g = self.nodes[c.index()].right;
                self.nodes[index.index()].left = g;
                self.nodes[g.index()].parent = index;
                self.nodes[c.index()].right = b;
                self.nodes[b.index()].parent = c;
                self.nodes[c.index()].bounds =
                    self.nodes[f.index()].bounds.union(&self.nodes[b.index()].bounds);
            }
            Rotation::CD => {
                let d = self.nodes[b.index()].left;
                let e = self.nodes[b.index()].right;
                self.nodes[index.index()].right = d;
                self.nodes[d.index()].parent = index;
                self.nodes[b.index()].left = c;
                self.nodes[c.index()].parent = b;
                self.nodes[b.index()].bounds =
                    self.nodes[c.index()].bounds.union(&self.nodes[e.index()].bounds);
            }
            Rotation::CE => {
                let d = self.nodes[b.index()].left;
                let e = self.nodes[b.index()].right;
                self.nodes[index.index()].right = e;
                self.nodes[e.index()].parent = index;
                self.nodes[b.index()].right = c;
                self.nodes[c.index()].parent = b;
                self.nodes[b.index()].bounds =
                    self.nodes[d.index()].bounds.union(&self.nodes[c.index()].bounds);
            }
        }
    }

    /// Depth-first traversal pruned by `predicate` on node bounds, writing
    /// leaf payloads into `results`. Returns how many were written.
    ///
    /// Stops early once `results` is full; subtrees that would overflow the
    /// fixed traversal stack are skipped.
    pub fn query<F>(&self, mut predicate: F, results: &mut [T]) -> usize
    where
        F: FnMut(&Aabb) -> bool,
    {
        if self.root.is_null() || results.is_empty() {
            return 0;
        }

        let mut stack = [NodeId::NULL; BVH_STACK_DEPTH];
        stack[0] = self.root;
        let mut top = 1;
        let mut count = 0;

        while top > 0 {
            top -= 1;
            let node = &self.nodes[stack[top].index()];
            if !predicate(&node.bounds) {
                continue;
            }

            if node.is_leaf() {
                if let Some(data) = node.data {
                    results[count] = data;
                    count += 1;
                    if count == results.len() {
                        break;
                    }
                }
            } else if top + 2 <= BVH_STACK_DEPTH {
                stack[top] = node.left;
                stack[top + 1] = node.right;
                top += 2;
            }
        }

        count
    }

    pub fn query_bounds(&self, bounds: &Aabb, results: &mut [T]) -> usize {
        self.query(|node| node.overlaps(bounds), results)
    }

    pub fn query_point(&self, point: Vec3, results: &mut [T]) -> usize {
        self.query(|node| node.contains_point(point), results)
    }

    pub fn query_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32, results: &mut [T]) -> usize {
        self.query(
            |node| node.ray_intersect(origin, direction, max_distance).is_some(),
            results,
        )
    }

    /// All live leaves and their payloads.
    pub fn iter_leaves(&self) -> impl Iterator<Item = (NodeId, T)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(index, node)| {
            let id = NodeId(index as u32);
            if node.parent == id || !node.is_leaf() {
                return None;
            }
            node.data.map(|data| (id, data))
        })
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = NodeId::NULL;
        self.free_list = NodeId::NULL;
        self.leaf_count = 0;
    }

    /// Rebuilds the hierarchy from scratch by repeatedly merging the pair of
    /// roots whose union has the smallest surface area. Leaf ids survive.
    pub fn rebuild(&mut self) {
        let mut roots = std::mem::take(&mut self.rebuild_scratch);
        roots.clear();

        for index in 0..self.nodes.len() {
            let id = NodeId(index as u32);
            let node = &self.nodes[index];
            if node.parent == id {
                continue;
            }
            if node.is_leaf() {
                roots.push(id);
            } else {
                self.free_node(id);
            }
        }
        for &leaf in &roots {
            self.nodes[leaf.index()].parent = NodeId::NULL;
        }

        debug!("rebuilding AABB tree with {} leaves", roots.len());

        if roots.is_empty() {
            self.root = NodeId::NULL;
            self.rebuild_scratch = roots;
            return;
        }

        let mut partners = std::mem::take(&mut self.partner_scratch);
        partners.clear();
        for k in 0..roots.len() {
            partners.push(self.best_partner(&roots, k));
        }

        while roots.len() > 1 {
            let Some((i, &(j, _))) = partners
                .iter()
                .enumerate()
                .min_by(|(_, x), (_, y)| x.1.total_cmp(&y.1))
            else {
                break;
            };
            let (lo, hi) = if i < j { (i, j) } else { (j, i) };
            let last = roots.len() - 1;

            let parent = self.allocate_node();
            let (a, b) = (roots[lo], roots[hi]);
            let bounds = self.nodes[a.index()].bounds.union(&self.nodes[b.index()].bounds);
            {
                let node = &mut self.nodes[parent.index()];
                node.bounds = bounds;
                node.left = a;
                node.right = b;
            }
            self.nodes[a.index()].parent = parent;
            self.nodes[b.index()].parent = parent;

            roots[lo] = parent;
            roots.swap_remove(hi);
            partners.swap_remove(hi);

            for k in 0..roots.len() {
                if k == lo {
                    continue;
                }
                let partner = partners[k].0;
                if partner == lo || partner == hi {
                    partners[k] = self.best_partner(&roots, k);
                    continue;
                }
                if partner == last {
                    partners[k].0 = hi;
                }
                let cost = self.pair_cost(roots[k], roots[lo]);
                if cost < partners[k].1 {
                    partners[k] = (lo, cost);
                }
            }
            if roots.len() > 1 {
                partners[lo] = self.best_partner(&roots, lo);
            }
        }

        self.root = roots[0];
        self.nodes[self.root.index()].parent = NodeId::NULL;
        self.rebuild_scratch = roots;
        self.partner_scratch = partners;
    }

    fn pair_cost(&self, a: NodeId, b: NodeId) -> f32 {
        self.nodes[a.index()]
            .bounds
            .union(&self.nodes[b.index()].bounds)
            .surface_area()
    }

    fn best_partner(&self, roots: &[NodeId], k: usize) -> (usize, f32) {
        let mut best = (k, f32::INFINITY);
        for (other, &id) in roots.iter().enumerate() {
            if other == k {
                continue;
            }
            let cost = self.pair_cost(roots[k], id);
            if cost < best.1 {
                best = (other, cost);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lcg(u32);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (self.0 >> 8) as f32 / (1u32 << 24) as f32
        }

        fn next_box(&mut self, extent: f32) -> Aabb {
            let center = Vec3::new(self.next_f32(), self.next_f32(), self.next_f32()) * extent;
            let half = Vec3::new(self.next_f32(), self.next_f32(), self.next_f32()) * 0.5 + Vec3::splat(0.05);
            Aabb::from_center_half_extents(center, half)
        }
    }

    /// Walks the tree checking parent links, bounds containment and the
    /// free-list marker; returns the number of reachable leaves.
    fn validate<T: Copy>(tree: &AabbTree<T>) -> usize {
        if tree.root.is_null() {
            return 0;
        }
        assert!(tree.nodes[tree.root.index()].parent.is_null());
        let mut leaves = 0;
        let mut stack = vec![tree.root];
        while let Some(id) = stack.pop() {
            let node = &tree.nodes[id.index()];
            assert_ne!(node.parent, id, "reachable node is marked free");
            if node.is_leaf() {
                assert!(node.right.is_null());
                assert!(node.data.is_some());
                leaves += 1;
                continue;
            }
            for child in [node.left, node.right] {
                let child_node = &tree.nodes[child.index()];
                assert_eq!(child_node.parent, id, "broken parent link");
                assert!(node.bounds.contains(&child_node.bounds), "parent must enclose child");
                stack.push(child);
            }
        }
        leaves
    }

    #[test]
    fn empty_tree_has_null_root() {
        let mut tree: AabbTree<u32> = AabbTree::new();
        assert!(tree.is_empty());
        assert!(tree.root().is_null());

        let id = tree.create_node(Aabb::new(Vec3::ZERO, Vec3::ONE), 7);
        assert!(!tree.is_empty());
        tree.remove_node(id);
        assert!(tree.is_empty());
        assert!(tree.root().is_null());
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn leaves_contain_their_input_bounds() {
        let mut rng = Lcg(7);
        let mut tree = AabbTree::new();
        let mut inputs = Vec::new();
        for i in 0..64u32 {
            let bounds = rng.next_box(20.0);
            inputs.push((tree.create_node(bounds, i), bounds));
        }
        for (id, bounds) in inputs {
            let fat = tree.fat_bounds(id).expect("live leaf");
            assert!(fat.contains(&bounds));
        }
        assert_eq!(validate(&tree), 64);
    }

    #[test]
    fn query_bounds_matches_brute_force() {
        let mut rng = Lcg(42);
        let mut tree = AabbTree::new();
        let mut ids = Vec::new();
        for i in 0..100u32 {
            ids.push(tree.create_node(rng.next_box(30.0), i));
        }

        let mut results = [0u32; 128];
        for _ in 0..20 {
            let region = rng.next_box(30.0).expanded(2.0);
            let count = tree.query_bounds(&region, &mut results);
            let mut found: Vec<u32> = results[..count].to_vec();
            found.sort_unstable();

            let mut expected: Vec<u32> = ids
                .iter()
                .filter(|id| tree.fat_bounds(**id).unwrap().overlaps(&region))
                .map(|id| tree.node_data(*id).unwrap())
                .collect();
            expected.sort_unstable();

            assert_eq!(found, expected);
        }
    }

    #[test]
    fn leaf_count_tracks_inserts_and_removes() {
        let mut rng = Lcg(3);
        let mut tree = AabbTree::new();
        let ids: Vec<_> = (0..50u32).map(|i| tree.create_node(rng.next_box(10.0), i)).collect();
        for id in ids.iter().step_by(3) {
            tree.remove_node(*id);
        }
        let removed = ids.iter().step_by(3).count();
        assert_eq!(tree.leaf_count(), 50 - removed);
        assert_eq!(validate(&tree), 50 - removed);
        assert_eq!(tree.iter_leaves().count(), 50 - removed);
    }

    #[test]
    fn freed_slots_are_recycled() {
        let mut tree = AabbTree::new();
        let a = tree.create_node(Aabb::new(Vec3::ZERO, Vec3::ONE), 1u8);
        let _b = tree.create_node(Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0)), 2u8);
        let capacity = tree.nodes.len();
        tree.remove_node(a);
        assert!(tree.fat_bounds(a).is_none(), "freed slot must not resolve");
        tree.create_node(Aabb::new(Vec3::splat(5.0), Vec3::splat(6.0)), 3u8);
        assert_eq!(tree.nodes.len(), capacity, "no growth while free slots exist");
    }

    #[test]
    fn move_node_is_noop_inside_fat_bounds() {
        let mut tree = AabbTree::new();
        let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let id = tree.create_node(bounds, 0u32);

        let nudged = bounds.translated(Vec3::splat(tree.margin() * 0.5));
        assert!(!tree.move_node(id, nudged, Vec3::splat(0.05)));

        let far = bounds.translated(Vec3::new(5.0, 0.0, 0.0));
        assert!(tree.move_node(id, far, Vec3::new(5.0, 0.0, 0.0)));
        let fat = tree.fat_bounds(id).unwrap();
        assert!(fat.contains(&far));
        assert!(fat.max.x > far.max.x + 5.0, "leaf should be stretched along its motion");
    }

    #[test]
    fn moving_many_leaves_keeps_tree_valid() {
        let mut rng = Lcg(11);
        let mut tree = AabbTree::new();
        let mut leaves: Vec<_> = (0..40u32)
            .map(|i| {
                let bounds = rng.next_box(15.0);
                (tree.create_node(bounds, i), bounds)
            })
            .collect();

        for _ in 0..10 {
            for (id, bounds) in leaves.iter_mut() {
                let offset = Vec3::new(rng.next_f32() - 0.5, rng.next_f32() - 0.5, rng.next_f32() - 0.5) * 3.0;
                *bounds = bounds.translated(offset);
                tree.move_node(*id, *bounds, offset);
                assert!(tree.fat_bounds(*id).unwrap().contains(bounds));
            }
            assert_eq!(validate(&tree), 40);
        }
    }

    #[test]
    fn rebuild_preserves_leaves_and_queries() {
        let mut rng = Lcg(99);
        let mut tree = AabbTree::new();
        for i in 0..60u32 {
            tree.create_node(rng.next_box(25.0), i);
        }
        let region = Aabb::new(Vec3::splat(5.0), Vec3::splat(15.0));
        let mut before = [0u32; 64];
        let count_before = tree.query_bounds(&region, &mut before);
        let mut before = before[..count_before].to_vec();
        before.sort_unstable();

        tree.rebuild();
        assert_eq!(validate(&tree), 60);
        assert_eq!(tree.leaf_count(), 60);

        let mut after = [0u32; 64];
        let count_after = tree.query_bounds(&region, &mut after);
        let mut after = after[..count_after].to_vec();
        after.sort_unstable();
        assert_eq!(before, after);
    }

    #[test]
    fn repeated_rebuilds_reuse_scratch_buffers() {
        let mut rng = Lcg(7);
        let mut tree = AabbTree::with_capacity(32, 0.1, 2.0);
        for i in 0..32u32 {
            tree.create_node(rng.next_box(20.0), i);
        }
        tree.rebuild();
        let roots = (tree.rebuild_scratch.as_ptr(), tree.rebuild_scratch.capacity());
        let partners = (tree.partner_scratch.as_ptr(), tree.partner_scratch.capacity());
        let nodes = tree.nodes.capacity();
        assert!(roots.1 >= 32 && partners.1 >= 32);

        for _ in 0..5 {
            tree.rebuild();
            assert_eq!(validate(&tree), 32);
        }
        assert_eq!((tree.rebuild_scratch.as_ptr(), tree.rebuild_scratch.capacity()), roots);
        assert_eq!((tree.partner_scratch.as_ptr(), tree.partner_scratch.capacity()), partners);
        assert_eq!(tree.nodes.capacity(), nodes);
    }

    #[test]
    fn queries_truncate_at_result_capacity() {
        let mut tree = AabbTree::new();
        for i in 0..10u32 {
            tree.create_node(Aabb::new(Vec3::ZERO, Vec3::ONE), i);
        }
        let mut results = [0u32; 4];
        let count = tree.query_point(Vec3::splat(0.5), &mut results);
        assert_eq!(count, 4);
    }

    #[test]
    fn ray_query_finds_leaves_along_the_ray() {
        let mut tree = AabbTree::new();
        tree.create_node(Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, 5.0), Vec3::ONE), 1u32);
        tree.create_node(Aabb::from_center_half_extents(Vec3::new(10.0, 0.0, 5.0), Vec3::ONE), 2u32);
        let mut results = [0u32; 4];
        let count = tree.query_ray(Vec3::ZERO, Vec3::Z, 20.0, &mut results);
        assert_eq!(&results[..count], &[1]);
    }
}
