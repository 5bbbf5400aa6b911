use core::{borrow::Borrow, ptr::NonNull};

use crate::{entry::InsertAs, tracing_helpers::trace_log, AvlTree, Dir, Links, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Inserts an item into the tree.
    ///
    /// If the tree already contains an item with an equal key, `item` takes over that item's
    /// position in the tree and the previous item is returned. The shape of the tree and its
    /// balance factors do not change in that case.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);
        let key = unsafe { ptr.as_ref().key() };

        match self.search(key) {
            Ok(existing) => Some(unsafe { self.replace_node(existing, ptr) }),
            Err(insert_as) => {
                unsafe { self.link_leaf(insert_as, ptr) };
                None
            }
        }
    }

    // Links `node` into the empty slot `insert_as` as a new leaf and rebalances.
    //
    // # Safety
    //
    // `insert_as` must have been produced by a search for `node`'s key, with no modification of
    // the tree since.
    pub(crate) unsafe fn link_leaf(&mut self, insert_as: InsertAs<T>, node: NonNull<T>) {
        unsafe {
            T::links(node).as_mut().clear();
            self.len += 1;

            let (parent, dir) = match insert_as {
                InsertAs::Root => {
                    self.root = Some(node);
                    return;
                }
                InsertAs::Child { parent, dir } => (parent, dir),
            };

            T::links(parent).as_mut().set_child(dir, Some(node));
            T::links(node).as_mut().set_parent(Some(parent));

            if self.balance(parent) == 0 {
                // `parent` was a leaf, so its subtree just grew.
                self.set_balance(parent, dir.balance_delta());
                self.insert_fix(parent, node);
            } else {
                // `parent` had a single child and `node` filled the empty side.
                self.set_balance(parent, 0);
            }
        }
    }

    // Propagates the growth of `parent`'s subtree toward the root after `node`, a child of
    // `parent`, grew by one level.
    //
    // Invariants:
    // - `b(parent)` is already up to date and nonzero.
    // - No node above `parent` has been updated yet.
    unsafe fn insert_fix(&mut self, mut parent: NonNull<T>, mut node: NonNull<T>) {
        unsafe {
            while let Some(grandparent) = T::links(parent).as_ref().parent() {
                let dir = self.which_child(grandparent, parent);
                let delta = dir.balance_delta();
                let balance = self.balance(grandparent) + delta;

                if balance == 0 {
                    // The shorter side caught up; `h(grandparent)` is unchanged.
                    self.set_balance(grandparent, 0);

                    trace_log!(dir = ?dir, "insert: growth absorbed");
                    return;
                }

                if balance == delta {
                    // `grandparent` was balanced and is now one level taller. Ascend.
                    self.set_balance(grandparent, balance);
                    node = parent;
                    parent = grandparent;
                    continue;
                }

                // `grandparent` is at +/-2 on the `dir` side.
                if T::links(parent).as_ref().child(dir) == Some(node) {
                    // Outer grandchild: a single rotation restores the original height.
                    self.rotate(grandparent, !dir);
                    self.set_balance(parent, 0);
                    self.set_balance(grandparent, 0);

                    trace_log!(dir = ?dir, "insert: single rotation");
                } else {
                    // Inner grandchild: `node` is raised above both `parent` and `grandparent`.
                    let node_balance = self.balance(node);

                    self.rotate(parent, dir);
                    self.rotate(grandparent, !dir);

                    let (parent_balance, grandparent_balance) = if node_balance == delta {
                        (0, -delta)
                    } else if node_balance == 0 {
                        (0, 0)
                    } else {
                        (delta, 0)
                    };

                    self.set_balance(parent, parent_balance);
                    self.set_balance(grandparent, grandparent_balance);
                    self.set_balance(node, 0);

                    trace_log!(dir = ?dir, node_balance, "insert: double rotation");
                }

                return;
            }
        }
    }

    /// Removes the item corresponding to `key` from the tree and returns it.
    ///
    /// Returns `None`, leaving the tree unchanged, if no item corresponds to `key`.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            // A node with two children first trades places with its predecessor, which has no right
            // child. Either way `node` ends up with at most one child.
            if let (Some(left), Some(_)) = (
                T::links(node).as_ref().left(),
                T::links(node).as_ref().right(),
            ) {
                let predecessor = self.extreme_in_subtree(left, Dir::Right);
                self.swap_nodes(node, predecessor);
            }

            let links = T::links(node).as_ref();
            let parent = links.parent();
            let child = links.left().or(links.right());
            let side = parent.map(|p| self.which_child(p, node));

            self.replace_child_or_set_root(parent, node, child);
            self.maybe_set_parent(child, parent);

            T::links(node).as_mut().clear();
            self.len -= 1;

            if let (Some(parent), Some(side)) = (parent, side) {
                self.remove_fix(parent, side);
            }

            T::from_ptr(node)
        }
    }

    // Restores balance after the `shrunk` subtree of `node` lost one level, continuing toward the
    // root for as long as the rebalanced subtree itself keeps losing height.
    unsafe fn remove_fix(&mut self, node: NonNull<T>, shrunk: Dir) {
        let mut opt_node = Some(node);
        let mut shrunk = shrunk;

        unsafe {
            while let Some(node) = opt_node {
                // Read before any rotation moves `node` below its replacement.
                let parent = T::links(node).as_ref().parent();
                let side = parent.map(|p| self.which_child(p, node));

                let heavy = !shrunk;
                let diff = heavy.balance_delta();
                let balance = self.balance(node) + diff;

                if balance == diff {
                    // `node` was balanced; `h(node)` is unchanged.
                    self.set_balance(node, diff);

                    trace_log!(dir = ?shrunk, "remove: height unchanged");
                    return;
                }

                if balance == 0 {
                    // The taller side lost a level, and so did `node`.
                    self.set_balance(node, 0);
                } else {
                    // `node` is at +/-2 on the `heavy` side.
                    let child = T::links(node)
                        .as_ref()
                        .child(heavy)
                        .expect("a node at +/-2 must have a child on its heavy side");
                    let child_balance = self.balance(child);

                    if child_balance == 0 {
                        // The rotated subtree keeps its height.
                        self.rotate(node, shrunk);
                        self.set_balance(node, diff);
                        self.set_balance(child, -diff);

                        trace_log!(dir = ?shrunk, "remove: single rotation, height kept");
                        return;
                    }

                    if child_balance == diff {
                        self.rotate(node, shrunk);
                        self.set_balance(node, 0);
                        self.set_balance(child, 0);

                        trace_log!(dir = ?shrunk, "remove: single rotation");
                    } else {
                        let grandchild = T::links(child)
                            .as_ref()
                            .child(shrunk)
                            .expect("an inner-heavy child must have an inner child");
                        let grandchild_balance = self.balance(grandchild);

                        self.rotate(child, heavy);
                        self.rotate(node, shrunk);

                        let (node_balance, child_balance) = if grandchild_balance == -diff {
                            (0, diff)
                        } else if grandchild_balance == 0 {
                            (0, 0)
                        } else {
                            (-diff, 0)
                        };

                        self.set_balance(node, node_balance);
                        self.set_balance(child, child_balance);
                        self.set_balance(grandchild, 0);

                        trace_log!(dir = ?shrunk, grandchild_balance, "remove: double rotation");
                    }
                }

                opt_node = parent;
                if let Some(side) = side {
                    shrunk = side;
                }
            }
        }
    }

    // Rotates the subtree rooted at `node` toward `dir`: the `!dir` child of `node` takes its place
    // and `node` becomes that child's `dir` child. The `dir` subtree of the promoted child moves
    // across to become the `!dir` child of `node`.
    //
    // Balance factors are not updated; the correct values depend on which case triggered the
    // rotation, so callers assign them.
    unsafe fn rotate(&mut self, node: NonNull<T>, dir: Dir) {
        unsafe {
            let up = T::links(node)
                .as_ref()
                .child(!dir)
                .expect("rotation requires a child to promote");
            let across = T::links(up).as_ref().child(dir);
            let parent = T::links(node).as_ref().parent();

            T::links(up).as_mut().set_parent(parent);
            self.replace_child_or_set_root(parent, node, Some(up));

            self.maybe_set_parent(across, Some(node));
            T::links(node).as_mut().set_child(!dir, across);

            T::links(up).as_mut().set_child(dir, Some(node));
            T::links(node).as_mut().set_parent(Some(up));
        }
    }
}
