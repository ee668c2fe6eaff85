//! 数据模型层

pub mod file_tree;
pub mod mount_tree;
pub mod path;

pub use file_tree::{flatten_for_view, FileTreeRow, Listing, NodeKind};
pub use mount_tree::{MountNode, MountTree};
