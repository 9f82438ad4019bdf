mod internal;
mod leaf;
mod tree;

pub use tree::{BTree, ScanStream};
