//! Reference-model testing support.
//!
//! Random operation sequences are replayed against both an [`AvlMap`] and a
//! [`BTreeMap`], and the results of every operation must agree. The same runners back the
//! property tests and the `cargo fuzz` targets.

use std::{collections::BTreeMap, prelude::v1::*, ptr::NonNull};

use arbitrary::{Arbitrary, Unstructured};
use cordyceps::Linked;
use proptest::{
    prop_oneof,
    strategy::{Just, Strategy},
};

use crate::{AvlMap, AvlTree, CursorMut, KeyError, Links, TreeNode};

/// An intrusive node keyed by a `u32`.
#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
    // Payload that may be edited in place; it takes no part in ordering.
    pub value: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            key,
            value: 0,
            links: Links::new(),
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(node: Box<TestNode>) -> NonNull<TestNode> {
        Box::leak(node).into()
    }

    unsafe fn from_ptr(ptr: NonNull<TestNode>) -> Box<TestNode> {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<TestNode>) -> NonNull<Links<TestNode>> {
        // `links` is the first field of a `#[repr(C)]` struct.
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &u32 {
        &self.key
    }
}

/// How an operation picks its key.
///
/// `Present` selects among the keys in the map at the time the operation runs, so lookups and
/// removals hit far more often than with uniformly random keys.
#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum KeyChoice {
    Present(usize),
    Any(u32),
}

impl KeyChoice {
    fn resolve(self, present: &BTreeMap<u32, u32>) -> u32 {
        match self {
            KeyChoice::Present(n) if present.is_empty() => n as u32,
            KeyChoice::Present(n) => present
                .keys()
                .nth(n % present.len())
                .copied()
                .unwrap_or_default(),
            KeyChoice::Any(key) => key,
        }
    }
}

/// One end of the key range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Arbitrary)]
pub enum End {
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(KeyChoice, u32),
    Get(KeyChoice),
    At(KeyChoice),
    Remove(KeyChoice),
    Peek(End),
    Pop(End),
}

fn key_choice_strategy() -> impl Strategy<Value = KeyChoice> {
    prop_oneof![
        (0usize..1000).prop_map(KeyChoice::Present),
        (0u32..1000).prop_map(KeyChoice::Any),
    ]
}

fn end_strategy() -> impl Strategy<Value = End> {
    prop_oneof![Just(End::Min), Just(End::Max)]
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (key_choice_strategy(), 0u32..1000).prop_map(|(key, value)| Op::Insert(key, value)),
        1 => key_choice_strategy().prop_map(Op::Get),
        1 => key_choice_strategy().prop_map(Op::At),
        2 => key_choice_strategy().prop_map(Op::Remove),
        1 => end_strategy().prop_map(Op::Peek),
        1 => end_strategy().prop_map(Op::Pop),
    ]
}

/// Asserts the structural invariants of `map`, its agreement with `reference`, and the AVL
/// height bound.
pub fn check_map(map: &AvlMap<u32, u32>, reference: &BTreeMap<u32, u32>) {
    map.assert_invariants();

    assert_eq!(map.len(), reference.len());
    assert!(map.iter().eq(reference.iter()));
    assert!(map.iter().rev().eq(reference.iter().rev()));

    let bound = 1.45 * ((map.len() + 2) as f64).log2();
    assert!(
        map.height() as f64 <= bound,
        "height {} exceeds bound {bound} for {} nodes",
        map.height(),
        map.len()
    );
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut reference = BTreeMap::new();
    let mut avl = AvlMap::new();

    for (step, op) in ops.into_iter().enumerate() {
        match op {
            Op::Insert(key, value) => {
                let key = key.resolve(&reference);
                assert_eq!(
                    reference.insert(key, value),
                    avl.insert(key, value),
                    "step {step}: insert {key}"
                );
            }

            Op::Get(key) => {
                let key = key.resolve(&reference);
                assert_eq!(reference.get(&key), avl.get(&key), "step {step}: get {key}");
            }

            Op::At(key) => {
                let key = key.resolve(&reference);
                assert_eq!(
                    reference.get(&key).ok_or(KeyError),
                    avl.at(&key),
                    "step {step}: at {key}"
                );
            }

            Op::Remove(key) => {
                let key = key.resolve(&reference);
                assert_eq!(reference.remove(&key), avl.remove(&key), "step {step}: remove {key}");
            }

            Op::Peek(End::Min) => {
                assert_eq!(reference.first_key_value(), avl.first_key_value(), "step {step}");
            }

            Op::Peek(End::Max) => {
                assert_eq!(reference.last_key_value(), avl.last_key_value(), "step {step}");
            }

            Op::Pop(End::Min) => {
                assert_eq!(reference.pop_first(), avl.pop_first(), "step {step}");
            }

            Op::Pop(End::Max) => {
                assert_eq!(reference.pop_last(), avl.pop_last(), "step {step}");
            }
        }

        check_map(&avl, &reference);
    }
}

/// A cursor direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Arbitrary)]
pub enum Toward {
    Prev,
    Next,
}

/// An operation on a [`CursorMut`]. The current element is compared after every operation.
#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum CursorOp {
    Move(Toward),
    Peek(Toward),
    /// Removes the current element and moves in the given direction.
    Remove(Toward),
}

pub fn cursor_op_strategy() -> impl Strategy<Value = CursorOp> {
    let toward = prop_oneof![Just(Toward::Prev), Just(Toward::Next)];

    prop_oneof![
        3 => toward.clone().prop_map(CursorOp::Move),
        1 => toward.clone().prop_map(CursorOp::Peek),
        1 => toward.prop_map(CursorOp::Remove),
    ]
}

#[derive(Clone, Debug)]
pub struct CursorEquivalenceInput {
    pub values: Vec<u32>,
    pub ops: Vec<CursorOp>,
}

impl<'a> Arbitrary<'a> for CursorEquivalenceInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let num_values = usize::from(u8::arbitrary(u)? % 100);
        let num_ops = usize::from(u16::arbitrary(u)? % 1000);

        let mut values = Vec::with_capacity(num_values);
        for _ in 0..num_values {
            values.push(u32::arbitrary(u).unwrap_or_default());
        }

        // Running out of input just ends the operation list early.
        let mut ops = Vec::with_capacity(num_ops);
        for _ in 0..num_ops {
            match CursorOp::arbitrary(u) {
                Ok(op) => ops.push(op),
                Err(_) => break,
            }
        }

        Ok(CursorEquivalenceInput { values, ops })
    }
}

// A cursor over a sorted `Vec`, where `None` is the ghost position between the last and the first
// element.
struct ModelCursor {
    keys: Vec<u32>,
    pos: Option<usize>,
}

impl ModelCursor {
    fn neighbor(&self, toward: Toward) -> Option<usize> {
        let len = self.keys.len();

        match (self.pos, toward) {
            (Some(i), Toward::Next) => Some(i + 1).filter(|&j| j < len),
            (Some(i), Toward::Prev) => i.checked_sub(1),
            (None, Toward::Next) => (len > 0).then_some(0),
            (None, Toward::Prev) => len.checked_sub(1),
        }
    }

    fn current(&self) -> Option<&u32> {
        self.pos.map(|i| &self.keys[i])
    }

    fn peek(&self, toward: Toward) -> Option<&u32> {
        self.neighbor(toward).map(|i| &self.keys[i])
    }

    fn step(&mut self, toward: Toward) {
        self.pos = self.neighbor(toward);
    }

    fn remove(&mut self, toward: Toward) -> Option<u32> {
        let i = self.pos?;
        let removed = self.keys.remove(i);

        // After the removal, index `i` holds the old successor.
        self.pos = match toward {
            Toward::Next => Some(i).filter(|&i| i < self.keys.len()),
            Toward::Prev => i.checked_sub(1),
        };

        Some(removed)
    }
}

fn cursor_step(cursor: &mut CursorMut<'_, TestNode>, toward: Toward) {
    match toward {
        Toward::Next => cursor.move_next(),
        Toward::Prev => cursor.move_prev(),
    }
}

fn cursor_peek<'c>(cursor: &'c CursorMut<'_, TestNode>, toward: Toward) -> Option<&'c u32> {
    let peeked = match toward {
        Toward::Next => cursor.peek_next(),
        Toward::Prev => cursor.peek_prev(),
    };

    peeked.map(TestNode::key)
}

fn cursor_remove(cursor: &mut CursorMut<'_, TestNode>, toward: Toward) -> Option<u32> {
    let removed = match toward {
        Toward::Next => cursor.remove_current(),
        Toward::Prev => cursor.remove_current_and_move_prev(),
    };

    removed.map(|node| node.key)
}

/// Replays cursor operations against a cursor over a sorted `Vec`.
pub fn run_cursor_equivalence(mut values: Vec<u32>, ops: Vec<CursorOp>) {
    values.sort_unstable();
    values.dedup();

    let mut avl: AvlTree<TestNode> = AvlTree::new();
    for &key in &values {
        assert!(avl.insert(TestNode::new(key)).is_none());
    }

    let mut model = ModelCursor {
        keys: values,
        pos: None,
    };
    model.step(Toward::Next);

    let mut cursor = avl.cursor_first_mut();
    assert_eq!(model.current(), cursor.get().map(TestNode::key));

    for (step, op) in ops.into_iter().enumerate() {
        match op {
            CursorOp::Move(toward) => {
                model.step(toward);
                cursor_step(&mut cursor, toward);
            }

            CursorOp::Peek(toward) => {
                assert_eq!(
                    model.peek(toward),
                    cursor_peek(&cursor, toward),
                    "step {step}: {op:?}"
                );
            }

            CursorOp::Remove(toward) => {
                assert_eq!(
                    model.remove(toward),
                    cursor_remove(&mut cursor, toward),
                    "step {step}: {op:?}"
                );
            }
        }

        assert_eq!(
            model.current(),
            cursor.get().map(TestNode::key),
            "step {step}: {op:?}"
        );
    }

    drop(cursor);
    avl.assert_invariants();
    assert!(avl.iter().map(TestNode::key).eq(model.keys.iter()));
}
