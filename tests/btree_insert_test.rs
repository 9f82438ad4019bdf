//! Insertion, including leaf splits and multi-level splits up to a new root
//! (spec.md §8 scenarios S2/S3/S6).

mod common;

use btree_store::{BTree, Record, StorageError, Value};

fn row(id: i32) -> Record {
    Record::new(vec![Value::Int(id), Value::Varchar(format!("row-{id}"))])
}

#[tokio::test]
async fn insert_then_search_round_trips() {
    let tree = BTree::create(common::pool(16), 1, common::wide_schema())
        .await
        .unwrap();
    tree.insert(row(1)).await.unwrap();
    tree.insert(row(2)).await.unwrap();

    assert_eq!(
        tree.search(&btree_store::Key(vec![Value::Int(1)])).await.unwrap(),
        Some(row(1))
    );
    assert_eq!(
        tree.search(&btree_store::Key(vec![Value::Int(2)])).await.unwrap(),
        Some(row(2))
    );
    assert_eq!(
        tree.search(&btree_store::Key(vec![Value::Int(3)])).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn duplicate_insert_is_rejected() {
    let tree = BTree::create(common::pool(16), 1, common::wide_schema())
        .await
        .unwrap();
    tree.insert(row(1)).await.unwrap();
    let err = tree.insert(row(1)).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey));
}

#[tokio::test]
async fn many_inserts_force_repeated_leaf_splits() {
    let tree = BTree::create(common::pool(64), 1, common::wide_schema())
        .await
        .unwrap();
    for id in 0..500 {
        tree.insert(row(id)).await.unwrap();
    }
    for id in 0..500 {
        assert_eq!(
            tree.search(&btree_store::Key(vec![Value::Int(id)])).await.unwrap(),
            Some(row(id)),
            "missing row {id} after bulk insert"
        );
    }
}

#[tokio::test]
async fn inserting_in_reverse_order_also_grows_a_correct_tree() {
    let tree = BTree::create(common::pool(64), 1, common::wide_schema())
        .await
        .unwrap();
    for id in (0..300).rev() {
        tree.insert(row(id)).await.unwrap();
    }
    let scanned = tree.scan_all().await.unwrap();
    let ids: Vec<i32> = scanned
        .iter()
        .map(|r| match r.values[0] {
            Value::Int(v) => v,
            _ => unreachable!(),
        })
        .collect();
    let expected: Vec<i32> = (0..300).collect();
    assert_eq!(ids, expected, "scan must yield rows in ascending key order");
}
