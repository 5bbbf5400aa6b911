use std::{ops::Range, prelude::v1::*, string::String};

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

// Lists the nodes in pre-order as `(key, balance)` pairs.
fn preorder(tree: &AvlTree<TestNode>) -> Vec<(u32, i8)> {
    fn visit(node: Link<TestNode>, out: &mut Vec<(u32, i8)>) {
        let Some(node) = node else {
            return;
        };

        unsafe {
            let links = TestNode::links(node).as_ref();
            out.push((node.as_ref().key, links.balance()));
            visit(links.left(), out);
            visit(links.right(), out);
        }
    }

    let mut out = Vec::new();
    visit(tree.root, &mut out);
    out
}

fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_none());
        tree.assert_invariants();
    }

    tree
}

fn keys_of(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn permutations(n: u32) -> Vec<Vec<u32>> {
    fn permute(prefix: &mut Vec<u32>, rest: &mut Vec<u32>, out: &mut Vec<Vec<u32>>) {
        if rest.is_empty() {
            out.push(prefix.clone());
            return;
        }

        for i in 0..rest.len() {
            let key = rest.remove(i);
            prefix.push(key);
            permute(prefix, rest, out);
            prefix.pop();
            rest.insert(i, key);
        }
    }

    let mut out = Vec::new();
    permute(&mut Vec::new(), &mut (0..n).collect(), &mut out);
    out
}

fn insert_find_all(keys: &[u32]) {
    let tree = tree_of(keys);

    for key in keys {
        let node = tree.get_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }

    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    assert_eq!(keys_of(&tree), sorted);
}

fn insert_remove_all(insert_order: &[u32], remove_order: &[u32]) {
    let mut tree = tree_of(insert_order);

    for key in remove_order {
        let node = tree.remove(key).expect("item not found");
        assert_eq!(node.key, *key);
        assert!(tree.get(key).is_none());
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
    assert!(tree.root.is_none());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn permutations_find() {
    for n in 1..=6 {
        for keys in permutations(n) {
            insert_find_all(&keys);
        }
    }
}

#[test]
fn permutations_remove_all_orders() {
    for n in 1..=4 {
        let perms = permutations(n);

        for insert_order in &perms {
            for remove_order in &perms {
                insert_remove_all(insert_order, remove_order);
            }
        }
    }
}

#[test]
fn permutations_remove_forward_and_reverse() {
    for n in 5..=6 {
        for keys in permutations(n) {
            insert_remove_all(&keys, &keys);

            let reversed = keys.iter().rev().copied().collect::<Vec<_>>();
            insert_remove_all(&keys, &reversed);
        }
    }
}

#[test]
fn ascending_inserts_rotate_left() {
    let tree = tree_of(&[1, 2, 3]);
    assert_eq!(preorder(&tree), [(2, 0), (1, 0), (3, 0)]);
}

#[test]
fn descending_inserts_rotate_right() {
    let tree = tree_of(&[3, 2, 1]);
    assert_eq!(preorder(&tree), [(2, 0), (1, 0), (3, 0)]);
}

#[test]
fn zigzag_inserts_rotate_twice() {
    assert_eq!(preorder(&tree_of(&[3, 1, 2])), [(2, 0), (1, 0), (3, 0)]);
    assert_eq!(preorder(&tree_of(&[1, 3, 2])), [(2, 0), (1, 0), (3, 0)]);
}

#[test]
fn insert_into_shorter_side_stops() {
    let tree = tree_of(&[2, 1, 3, 4]);
    assert_eq!(preorder(&tree), [(2, 1), (1, 0), (3, 1), (4, 0)]);

    let tree = tree_of(&[2, 1, 3, 4, 0]);
    assert_eq!(preorder(&tree), [(2, 0), (1, -1), (0, 0), (3, 1), (4, 0)]);
}

#[test]
fn remove_root_with_two_children() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    let removed = tree.remove(&4).expect("item not found");
    assert_eq!(removed.key, 4);
    tree.assert_invariants();

    // The predecessor, 3, takes the root's place.
    assert_eq!(
        preorder(&tree),
        [(3, 0), (2, -1), (1, 0), (6, 0), (5, 0), (7, 0)]
    );
    assert_eq!(keys_of(&tree), [1, 2, 3, 5, 6, 7]);
}

#[test]
fn remove_with_adjacent_predecessor() {
    // 2's predecessor is its direct left child.
    let mut tree = tree_of(&[2, 1, 3]);

    tree.remove(&2).expect("item not found");
    tree.assert_invariants();
    assert_eq!(preorder(&tree), [(1, 1), (3, 0)]);
}

#[test]
fn remove_rotation_keeps_height() {
    let mut tree = tree_of(&[2, 1, 4, 3, 5]);

    tree.remove(&1).expect("item not found");
    tree.assert_invariants();
    assert_eq!(preorder(&tree), [(4, -1), (2, 1), (3, 0), (5, 0)]);
}

#[test]
fn remove_double_rotation() {
    let mut tree = tree_of(&[2, 1, 4, 3]);

    tree.remove(&1).expect("item not found");
    tree.assert_invariants();
    assert_eq!(preorder(&tree), [(3, 0), (2, 0), (4, 0)]);
}

#[test]
fn remove_from_empty_tree() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.remove(&1).is_none());
    assert!(tree.pop_first().is_none());
    assert!(tree.pop_last().is_none());
    assert!(tree.is_empty());
    assert!(tree.root.is_none());
    tree.assert_invariants();
}

#[test]
fn remove_missing_key_is_noop() {
    let mut tree = tree_of(&[1, 2, 3]);
    let before = preorder(&tree);

    assert!(tree.remove(&7).is_none());
    assert_eq!(preorder(&tree), before);
    assert_eq!(tree.len(), 3);
}

#[test]
fn duplicate_insert_replaces_node_in_place() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3]);
    let shape = preorder(&tree);

    let original: *const TestNode = tree.get(&2).map(|node| node.get_ref()).unwrap();

    let replacement = TestNode::new(2);
    let replacement_ptr: *const TestNode = &*replacement;

    let old = tree.insert(replacement).expect("duplicate key must return the old item");
    tree.assert_invariants();

    assert_eq!(&*old as *const TestNode, original);
    assert_eq!(
        tree.get(&2).map(|node| node.get_ref() as *const TestNode),
        Some(replacement_ptr)
    );
    assert_eq!(preorder(&tree), shape);
    assert_eq!(tree.len(), 5);
}

#[test]
fn sequential_inserts_build_perfect_tree() {
    let keys = (0..1023).collect::<Vec<u32>>();
    let tree = tree_of(&keys);

    assert_eq!(tree.height(), 10);
    assert!(preorder(&tree).iter().all(|&(_, balance)| balance == 0));
}

#[test]
fn height_tracks_balance() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert_eq!(tree.height(), 0);

    tree.insert(TestNode::new(1));
    assert_eq!(tree.height(), 1);

    tree.insert(TestNode::new(2));
    assert_eq!(tree.height(), 2);

    tree.insert(TestNode::new(3));
    assert_eq!(tree.height(), 2);
}

#[test]
fn first_last_and_pop() {
    let mut tree = tree_of(&[5, 2, 8, 1, 9]);

    assert_eq!(tree.first().map(|node| node.key), Some(1));
    assert_eq!(tree.last().map(|node| node.key), Some(9));

    assert_eq!(tree.pop_first().map(|node| node.key), Some(1));
    assert_eq!(tree.pop_last().map(|node| node.key), Some(9));
    tree.assert_invariants();

    assert_eq!(keys_of(&tree), [2, 5, 8]);
}

#[test]
fn iter_is_double_ended() {
    let tree = tree_of(&[6, 3, 9, 1, 4]);

    let mut iter = tree.iter();
    assert_eq!(iter.len(), 5);
    assert_eq!(iter.next().map(|node| node.key), Some(1));
    assert_eq!(iter.next_back().map(|node| node.key), Some(9));
    assert_eq!(iter.len(), 3);
    assert_eq!(iter.map(|node| node.key).collect::<Vec<_>>(), [3, 4, 6]);

    let reversed = tree.iter().rev().map(|node| node.key).collect::<Vec<_>>();
    assert_eq!(reversed, [9, 6, 4, 3, 1]);
}

#[test]
fn entry_inserts_and_removes() {
    let mut tree = tree_of(&[1, 3]);

    match tree.entry(&2) {
        Entry::Vacant(entry) => {
            let node = unsafe { entry.insert(TestNode::new(2)) };
            assert_eq!(node.key, 2);
        }
        Entry::Occupied(_) => unreachable!("2 is not in the tree"),
    }
    tree.assert_invariants();

    match tree.entry(&3) {
        Entry::Occupied(entry) => assert_eq!(entry.remove().key, 3),
        Entry::Vacant(_) => unreachable!("3 is in the tree"),
    }
    tree.assert_invariants();

    assert_eq!(keys_of(&tree), [1, 2]);
}

#[test]
fn cursor_walks_and_wraps() {
    let tree = tree_of(&[2, 1, 3]);
    let mut cursor = tree.cursor_first();

    assert_eq!(cursor.get().map(|node| node.key), Some(1));
    assert_eq!(cursor.peek_prev().map(|node| node.key), None);

    cursor.move_next();
    cursor.move_next();
    assert_eq!(cursor.get().map(|node| node.key), Some(3));

    cursor.move_next();
    assert!(cursor.get().is_none());

    cursor.move_next();
    assert_eq!(cursor.get().map(|node| node.key), Some(1));

    let cursor = tree.cursor_last();
    assert_eq!(cursor.get().map(|node| node.key), Some(3));
    assert_eq!(cursor.peek_prev().map(|node| node.key), Some(2));
}

#[test]
fn cursor_removes_two_child_node() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);
    let mut cursor = tree.cursor_first_mut();

    while cursor.get().map(|node| node.key) != Some(4) {
        cursor.move_next();
    }

    assert_eq!(cursor.remove_current().map(|node| node.key), Some(4));
    assert_eq!(cursor.get().map(|node| node.key), Some(5));

    assert_eq!(
        cursor.remove_current_and_move_prev().map(|node| node.key),
        Some(5)
    );
    assert_eq!(cursor.get().map(|node| node.key), Some(3));

    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [1, 2, 3, 6, 7]);
}

#[test]
fn clear_drops_everything() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);

    tree.clear();
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    tree.assert_invariants();

    // The tree is reusable after clearing.
    tree.insert(TestNode::new(1));
    tree.assert_invariants();
}

#[test]
fn dotgraph_labels_balance() {
    let tree = tree_of(&[2, 1, 3, 4]);

    let mut out = String::new();
    tree.dotgraph("t", &mut out).unwrap();

    assert!(out.starts_with("digraph \"graph-t\""));
    assert!(out.contains("[label=\"2:1\"]"));
    assert!(out.contains("[label=\"3:1\"]"));
    assert!(out.contains("\"grapht-3\" -> \"grapht-4\";"));

    let mut empty = String::new();
    AvlTree::<TestNode>::new()
        .dotgraph("e", &mut empty)
        .unwrap();
    assert_eq!(empty, "digraph \"graph-e\" {}");
}

#[test]
fn occupied_entry_replaces_in_place() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);
    let shape = preorder(&tree);

    let replacement = TestNode::new(6);
    let replacement_ptr: *const TestNode = &*replacement;

    let Entry::Occupied(mut entry) = tree.entry(&6) else {
        unreachable!("6 is in the tree");
    };
    let original: *const TestNode = entry.get();

    let old = unsafe { entry.insert(replacement) };
    assert_eq!(&*old as *const TestNode, original);

    // The entry now refers to the replacement.
    assert_eq!(entry.get() as *const TestNode, replacement_ptr);

    unsafe { entry.get_mut().get_unchecked_mut().value = 60 };
    let node = unsafe { entry.into_mut() };
    assert_eq!((node.key, node.value), (6, 60));

    tree.assert_invariants();
    assert_eq!(preorder(&tree), shape);
    assert_eq!(tree.get(&6).map(|node| node.value), Some(60));
    assert_eq!(tree.len(), 7);
}

#[test]
fn cursor_mut_shares_a_read_only_view() {
    let mut tree = tree_of(&[2, 1, 3]);
    let mut cursor = tree.cursor_last_mut();
    cursor.move_prev();

    {
        let view = cursor.as_cursor();
        assert_eq!(view.get().map(|node| node.key), Some(2));
        assert_eq!(view.peek_next().map(|node| node.key), Some(3));
        assert_eq!(view.peek_prev().map(|node| node.key), Some(1));
    }

    let node = unsafe { cursor.get_mut() }.expect("cursor is on 2");
    unsafe { node.get_unchecked_mut().value = 20 };

    // Back to the ghost position.
    cursor.move_prev();
    cursor.move_prev();
    assert!(cursor.get().is_none());
    assert!(unsafe { cursor.get_mut() }.is_none());
    assert!(cursor.as_cursor().get().is_none());
    drop(cursor);

    assert_eq!(tree.get(&2).map(|node| node.value), Some(20));
    assert_eq!(keys_of(&tree), [1, 2, 3]);
    tree.assert_invariants();
}

#[test]
fn same_node_ignores_pointer_metadata() {
    let buf = [0u8; 4];

    let short = NonNull::from(&buf[..2]);
    let long = NonNull::from(&buf[..3]);
    let offset = NonNull::from(&buf[1..3]);

    assert!(same_node(short, long));
    assert!(!same_node(long, offset));
}

#[cfg(feature = "tracing")]
mod trace_events {
    use std::{
        fmt, format,
        prelude::v1::*,
        sync::{Arc, Mutex},
    };

    use tracing::{
        field::{Field, Visit},
        Event, Subscriber,
    };
    use tracing_subscriber::{
        layer::{Context, SubscriberExt},
        Layer, Registry,
    };

    use super::tree_of;
    use crate::model::TestNode;

    #[derive(Clone, Default)]
    struct Messages(Arc<Mutex<Vec<String>>>);

    impl<S: Subscriber> Layer<S> for Messages {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            struct Message<'a>(&'a mut Option<String>);

            impl Visit for Message<'_> {
                fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                    if field.name() == "message" {
                        *self.0 = Some(format!("{value:?}"));
                    }
                }
            }

            let mut message = None;
            event.record(&mut Message(&mut message));

            if let Some(message) = message {
                self.0.lock().unwrap().push(message);
            }
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<String> {
        let messages = Messages::default();
        let subscriber = Registry::default().with(messages.clone());

        tracing::subscriber::with_default(subscriber, f);

        let captured = messages.0.lock().unwrap().clone();
        captured
    }

    #[test]
    fn insert_reports_absorbed_growth() {
        let mut tree = tree_of(&[2, 1, 3, 4]);

        // 0 makes 1 left-heavy, which evens out the root.
        let messages = capture(|| {
            tree.insert(TestNode::new(0));
        });

        assert!(messages.iter().any(|m| m == "insert: growth absorbed"));
        tree.assert_invariants();
    }

    #[test]
    fn remove_reports_unchanged_height() {
        let mut tree = tree_of(&[2, 1, 3]);

        let messages = capture(|| {
            tree.remove(&1);
        });

        assert!(messages.iter().any(|m| m == "remove: height unchanged"));
        tree.assert_invariants();
    }
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn cursor_equivalence(
        values in proptest::collection::vec(0u32..500, 0..100),
        ops in proptest::collection::vec(model::cursor_op_strategy(), 0..300),
    ) {
        model::run_cursor_equivalence(values, ops);
    }
}
