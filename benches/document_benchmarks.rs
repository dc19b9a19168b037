use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crdt_document::clock::{ActorID, TimeTicket};
use crdt_document::element::{Array, Element, Primitive};
use crdt_document::text::Text;
use crdt_document::tree::Tree;

fn actor() -> ActorID {
    ActorID::new([1; 12])
}

fn tick(n: u64) -> TimeTicket {
    TimeTicket::new(n, 0, Some(actor()))
}

fn bench_text_sequential_edits(c: &mut Criterion) {
    c.bench_function("Text::edit 1000 sequential inserts", |b| {
        b.iter(|| {
            let mut text = Text::new(tick(0));
            for i in 0..1000 {
                let len = text.len();
                text.edit(len, len, Some("x"), tick(i + 1), &mut BTreeMap::new()).unwrap();
            }
            black_box(text.len())
        })
    });
}

fn bench_text_middle_overwrite(c: &mut Criterion) {
    c.bench_function("Text::edit overwrite in a 1000-char document", |b| {
        b.iter(|| {
            let mut text = Text::new(tick(0));
            text.edit(0, 0, Some(&"a".repeat(1000)), tick(1), &mut BTreeMap::new()).unwrap();
            for i in 0..100 {
                text.edit(500, 502, Some("zz"), tick(i + 2), &mut BTreeMap::new()).unwrap();
            }
            black_box(text.len())
        })
    });
}

fn bench_array_append(c: &mut Criterion) {
    c.bench_function("Array::insert_after 1000 appends", |b| {
        b.iter(|| {
            let mut arr = Array::new(tick(0));
            let mut prev = None;
            for i in 0..1000 {
                let at = tick(i + 1);
                let elem = Element::Primitive {
                    value: Primitive::Int32(i as i32),
                    created_at: at,
                    moved_at: None,
                    removed_at: None,
                };
                prev = Some(arr.insert_after(prev, elem).unwrap());
            }
            black_box(arr.len())
        })
    });
}

fn bench_array_concurrent_inserts_same_anchor(c: &mut Criterion) {
    c.bench_function("Array::insert_after 200 concurrent inserts at one anchor", |b| {
        b.iter(|| {
            let mut arr = Array::new(tick(0));
            let head = arr
                .insert_after(
                    None,
                    Element::Primitive {
                        value: Primitive::Int32(0),
                        created_at: tick(1),
                        moved_at: None,
                        removed_at: None,
                    },
                )
                .unwrap();
            for i in 0..200 {
                let at = tick(i + 2);
                let elem = Element::Primitive {
                    value: Primitive::Int32(i as i32),
                    created_at: at,
                    moved_at: None,
                    removed_at: None,
                };
                arr.insert_after(Some(head), elem).unwrap();
            }
            black_box(arr.len())
        })
    });
}

fn bench_tree_edit_by_path(c: &mut Criterion) {
    c.bench_function("Tree::edit_by_path 200 cross-sibling merges", |b| {
        b.iter(|| {
            let mut tree = Tree::new("r", tick(0));
            for i in 0..201 {
                let p = tree.append_element(tree.root(), "p", tick(i * 2 + 1));
                tree.append_text(p, "ab", tick(i * 2 + 2));
            }
            for i in 0..200 {
                // Merge paragraph `i` into `i + 1` by deleting the boundary
                // between them, the same cross-sibling shape the
                // `edit_by_path` unit tests exercise.
                tree.edit_by_path(&[0, 2], &[1, 2], &[], tick(500 + i as u64)).unwrap();
            }
            black_box(tree.size())
        })
    });
}

criterion_group!(
    benches,
    bench_text_sequential_edits,
    bench_text_middle_overwrite,
    bench_array_append,
    bench_array_concurrent_inserts_same_anchor,
    bench_tree_edit_by_path,
);
criterion_main!(benches);
