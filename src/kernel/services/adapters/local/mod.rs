//! 本地实现：真实目录上的文件系统与进程沙箱。

pub mod fs;
pub mod sandbox;
pub mod template;

pub use fs::LocalFs;
pub use sandbox::{LocalSandbox, ReadyDetector};
pub use template::{load_config, load_mount_tree};
