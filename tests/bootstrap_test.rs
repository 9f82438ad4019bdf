//! A freshly created table starts as a single empty leaf page (spec.md §8
//! scenario S1).

mod common;

use btree_store::{BTree, PageId, PageType};

#[tokio::test]
async fn empty_table_is_a_single_empty_leaf_root() {
    let bpm = common::pool(8);
    let tree = BTree::create(bpm.clone(), 1, common::int_key_schema())
        .await
        .unwrap();

    let root_id = tree.root_page_id().await;
    assert_eq!(root_id, PageId::new(1, 0));

    let page = bpm.fetch_page(root_id).await.unwrap();
    let (page_type, parent, prev, next, item_count) = page
        .read(|p| {
            (
                btree_store::PageHeader::new_readonly(p).page_type_readonly().unwrap(),
                btree_store::PageHeader::new_readonly(p).parent_index_readonly().unwrap(),
                btree_store::PageHeader::new_readonly(p).prev_leaf_readonly().unwrap(),
                btree_store::PageHeader::new_readonly(p).next_leaf_readonly().unwrap(),
                btree_store::SlottedPage::item_count(p).unwrap(),
            )
        })
        .await;
    page.unpin(false).await;

    assert_eq!(page_type, PageType::Leaf);
    assert_eq!(parent, btree_store::INVALID_PAGE_INDEX);
    assert_eq!(prev, btree_store::INVALID_PAGE_INDEX);
    assert_eq!(next, btree_store::INVALID_PAGE_INDEX);
    assert_eq!(item_count, 0);

    assert_eq!(tree.scan_all().await.unwrap(), Vec::new());
}
