use core::{pin::Pin, ptr::NonNull};

use crate::{AvlTree, Dir, Links, TreeNode};

/// A view into a single entry in an [`AvlTree`], which may be either vacant or occupied.
///
/// Both variants are produced by a single descent from the root, so acting on an entry does not
/// search the tree again.
pub enum Entry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    Vacant(VacantEntry<'tree, T>),
    Occupied(OccupiedEntry<'tree, T>),
}

// Where a vacant entry's node will be linked.
pub(crate) enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

pub struct VacantEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) tree: &'tree mut AvlTree<T>,
    pub(crate) insert_as: InsertAs<T>,
}

impl<'tree, T> VacantEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Inserts `item` at the key associated with this entry and rebalances the tree.
    ///
    /// # Safety
    ///
    /// `item.key()` must compare equal to the key this entry was looked up with.
    pub unsafe fn insert(self, item: T::Handle) -> Pin<&'tree mut T> {
        let mut ptr = T::into_ptr(item);

        unsafe {
            self.tree.link_leaf(self.insert_as, ptr);

            Pin::new_unchecked(ptr.as_mut())
        }
    }
}

pub struct OccupiedEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) tree: &'tree mut AvlTree<T>,
    pub(crate) node: NonNull<T>,
}

impl<'tree, T> OccupiedEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns the item this entry points at.
    pub fn get(&self) -> &T {
        // SAFETY: the tree is exclusively borrowed, so `node` is still linked and alive.
        unsafe { self.node.as_ref() }
    }

    /// Returns the item this entry points at, pinned and mutable.
    ///
    /// # Safety
    ///
    /// The item's key must keep comparing the same against every other key in the tree, and its
    /// links must not be touched.
    pub unsafe fn get_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: linked items never move while they are in the tree.
        unsafe { Pin::new_unchecked(self.node.as_mut()) }
    }

    /// Converts the entry into a pinned mutable reference to its item.
    ///
    /// # Safety
    ///
    /// See [`OccupiedEntry::get_mut`].
    pub unsafe fn into_mut(mut self) -> Pin<&'tree mut T> {
        unsafe { Pin::new_unchecked(self.node.as_mut()) }
    }

    /// Puts `item` in place of the existing item, returning the existing item.
    ///
    /// `item` takes over the position and balance factor of the existing item, so the shape of
    /// the tree does not change.
    ///
    /// # Safety
    ///
    /// `item`'s key must compare equal to the key of the item it replaces.
    pub unsafe fn insert(&mut self, item: T::Handle) -> T::Handle {
        let new_ptr = T::into_ptr(item);
        let old_ptr = self.node;

        // The entry follows the replacement.
        self.node = new_ptr;

        unsafe { self.tree.replace_node(old_ptr, new_ptr) }
    }

    /// Unlinks the item from the tree, rebalancing as needed, and returns it.
    pub fn remove(self) -> T::Handle {
        unsafe { self.tree.remove_at(self.node) }
    }
}
