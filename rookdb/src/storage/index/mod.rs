pub mod b_plus_tree;
pub mod iterator;

pub use b_plus_tree::Index;
pub use iterator::IndexIter;
