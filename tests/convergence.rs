//! Property-based convergence tests: replaying the same set of changes in
//! any permutation must converge on the same document.

use crdt_document::clock::{ActorID, ChangeID, Checkpoint, TimeTicket};
use crdt_document::document::Document;
use crdt_document::element::{Element, Primitive};
use crdt_document::operation::{Change, ChangePack, Operation, OperationKind};
use proptest::prelude::*;

fn actor(n: u8) -> ActorID {
    ActorID::new([n; 12])
}

fn set_change(key: &str, val: &str, lamport: u64, client_seq: u32, actor_id: ActorID) -> Change {
    let at = TimeTicket::new(lamport, 0, Some(actor_id));
    Change {
        id: ChangeID::new(client_seq, lamport, actor_id),
        operations: vec![Operation {
            parent_created_at: TimeTicket::initial(),
            executed_at: at,
            kind: OperationKind::Set {
                key: key.to_string(),
                value: Element::Primitive {
                    value: Primitive::Str(val.to_string()),
                    created_at: at,
                    moved_at: None,
                    removed_at: None,
                },
            },
        }],
        message: None,
    }
}

fn replay_in_order(changes: &[Change]) -> String {
    let mut doc = Document::new("d1", actor(0));
    for change in changes {
        let pack = ChangePack {
            document_key: String::from("d1"),
            checkpoint: Checkpoint::new(0, change.id.client_seq()),
            changes: vec![change.clone()],
            snapshot: None,
            min_synced_ticket: None,
            is_removed: false,
        };
        doc.apply_change_pack(pack).unwrap();
    }
    doc.to_sorted_json()
}

proptest! {
    #[test]
    fn any_permutation_of_disjoint_key_writes_converges(
        perm_seed in 0u64..24, // enough to cover all 4! permutations of 4 changes
    ) {
        let changes = vec![
            set_change("a", "1", 1, 1, actor(1)),
            set_change("b", "2", 2, 1, actor(2)),
            set_change("c", "3", 3, 1, actor(3)),
            set_change("d", "4", 4, 1, actor(4)),
        ];

        let mut permuted = changes.clone();
        // A cheap deterministic shuffle keyed by perm_seed: repeatedly rotate
        // and swap so distinct seeds in 0..24 visit distinct orderings of 4
        // elements without pulling in a shuffling crate.
        let mut seed = perm_seed;
        for i in (1..permuted.len()).rev() {
            let j = (seed % (i as u64 + 1)) as usize;
            seed /= (i as u64) + 1;
            permuted.swap(i, j);
        }

        let baseline = replay_in_order(&changes);
        let shuffled = replay_in_order(&permuted);
        prop_assert_eq!(baseline, shuffled);
    }

    #[test]
    fn same_key_conflicting_writes_converge_on_highest_ticket(
        perm_seed in 0u64..6,
    ) {
        let changes = vec![
            set_change("k", "from-1", 1, 1, actor(1)),
            set_change("k", "from-2", 2, 1, actor(2)),
            set_change("k", "from-3", 3, 1, actor(3)),
        ];

        let mut permuted = changes.clone();
        let mut seed = perm_seed;
        for i in (1..permuted.len()).rev() {
            let j = (seed % (i as u64 + 1)) as usize;
            seed /= (i as u64) + 1;
            permuted.swap(i, j);
        }

        let baseline = replay_in_order(&changes);
        let shuffled = replay_in_order(&permuted);
        prop_assert_eq!(baseline, shuffled);
        prop_assert_eq!(baseline, String::from(r#"{"k":"from-3"}"#));
    }
}
