//! 应用层（Workbench）

pub mod workbench;

pub use workbench::Workbench;
