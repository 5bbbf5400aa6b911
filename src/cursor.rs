use core::{marker::PhantomData, pin::Pin, ptr::NonNull};

use crate::{AvlTree, Dir, Link, Links, TreeNode};

/// A read-only cursor over an [`AvlTree`].
///
/// The cursor rests either on an element or on a "ghost" position that sits after the maximum
/// element and before the minimum one, so moving past either end wraps around through the ghost.
pub struct Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    raw: CursorRaw<T>,
    phantom: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T> Cursor<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree AvlTree<T>) -> Cursor<'tree, T> {
        Cursor {
            raw: CursorRaw::at_end(tree.into(), Dir::Left),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree AvlTree<T>) -> Cursor<'tree, T> {
        Cursor {
            raw: CursorRaw::at_end(tree.into(), Dir::Right),
            phantom: PhantomData,
        }
    }

    /// Moves to the in-order successor. From the ghost this is the minimum element; from the
    /// maximum element it is the ghost.
    pub fn move_next(&mut self) {
        unsafe { self.raw.step(Dir::Right) }
    }

    /// Moves to the in-order predecessor. From the ghost this is the maximum element; from the
    /// minimum element it is the ghost.
    pub fn move_prev(&mut self) {
        unsafe { self.raw.step(Dir::Left) }
    }

    /// Returns the current element, or `None` at the ghost position.
    pub fn get(&self) -> Option<&'tree T> {
        self.raw.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Returns the element [`move_next`](Self::move_next) would move to.
    pub fn peek_next(&self) -> Option<&'tree T> {
        unsafe { self.raw.peek(Dir::Right) }.map(|p| unsafe { p.as_ref() })
    }

    /// Returns the element [`move_prev`](Self::move_prev) would move to.
    pub fn peek_prev(&self) -> Option<&'tree T> {
        unsafe { self.raw.peek(Dir::Left) }.map(|p| unsafe { p.as_ref() })
    }
}

/// A cursor over an [`AvlTree`] that can remove elements.
///
/// Positions behave as for [`Cursor`].
pub struct CursorMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    raw: CursorRaw<T>,
    phantom: PhantomData<&'tree mut AvlTree<T>>,
}

impl<'tree, T> CursorMut<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree mut AvlTree<T>) -> CursorMut<'tree, T> {
        CursorMut {
            raw: CursorRaw::at_end(tree.into(), Dir::Left),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree mut AvlTree<T>) -> CursorMut<'tree, T> {
        CursorMut {
            raw: CursorRaw::at_end(tree.into(), Dir::Right),
            phantom: PhantomData,
        }
    }

    /// Returns a read-only cursor at the same position.
    ///
    /// The `CursorMut` remains immutably borrowed for the lifetime of the returned `Cursor`.
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor {
            raw: CursorRaw {
                tree: self.raw.tree,
                ptr: self.raw.ptr,
            },
            phantom: PhantomData,
        }
    }

    /// See [`Cursor::move_next`].
    pub fn move_next(&mut self) {
        unsafe { self.raw.step(Dir::Right) }
    }

    /// See [`Cursor::move_prev`].
    pub fn move_prev(&mut self) {
        unsafe { self.raw.step(Dir::Left) }
    }

    /// Returns the current element, or `None` at the ghost position.
    pub fn get(&self) -> Option<&T> {
        self.raw.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Returns a pinned mutable reference to the current element, or `None` at the ghost
    /// position.
    ///
    /// # Safety
    ///
    /// The caller must not modify the element in a way that changes how its key compares to the
    /// keys of other elements in the tree.
    pub unsafe fn get_mut(&mut self) -> Option<Pin<&mut T>> {
        self.raw
            .ptr
            .map(|mut p| unsafe { Pin::new_unchecked(p.as_mut()) })
    }

    /// See [`Cursor::peek_next`].
    pub fn peek_next(&self) -> Option<&T> {
        unsafe { self.raw.peek(Dir::Right) }.map(|p| unsafe { p.as_ref() })
    }

    /// See [`Cursor::peek_prev`].
    pub fn peek_prev(&self) -> Option<&T> {
        unsafe { self.raw.peek(Dir::Left) }.map(|p| unsafe { p.as_ref() })
    }

    /// Removes the current element and moves to its successor.
    ///
    /// At the ghost position nothing is removed and `None` is returned.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        unsafe { self.raw.remove_and_step(Dir::Right) }
    }

    /// Removes the current element and moves to its predecessor.
    ///
    /// At the ghost position nothing is removed and `None` is returned.
    pub fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        unsafe { self.raw.remove_and_step(Dir::Left) }
    }
}

struct CursorRaw<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    tree: NonNull<AvlTree<T>>,
    // `None` is the ghost position.
    ptr: Link<T>,
}

impl<T> CursorRaw<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    // A cursor at the minimum (`Dir::Left`) or maximum (`Dir::Right`) element.
    fn at_end(tree: NonNull<AvlTree<T>>, end: Dir) -> CursorRaw<T> {
        let mut raw = CursorRaw { tree, ptr: None };
        raw.ptr = unsafe { raw.peek(!end) };
        raw
    }

    // The position one step toward `dir`: successor for `Dir::Right`, predecessor for `Dir::Left`.
    unsafe fn peek(&self, dir: Dir) -> Link<T> {
        let tree = unsafe { self.tree.as_ref() };

        match self.ptr {
            Some(p) => unsafe { tree.neighbor_raw(p, dir) },
            None => match dir {
                Dir::Right => tree.first_raw(),
                Dir::Left => tree.last_raw(),
            },
        }
    }

    unsafe fn step(&mut self, dir: Dir) {
        self.ptr = unsafe { self.peek(dir) };
    }

    unsafe fn remove_and_step(&mut self, dir: Dir) -> Option<T::Handle> {
        let remove = self.ptr?;

        unsafe {
            self.step(dir);

            // Removal relinks nodes but never frees or re-keys a node other than `remove`, so the
            // new position stays valid.
            Some(self.tree.as_mut().remove_at(remove))
        }
    }
}
