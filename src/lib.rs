//! sandbench - 浏览器内开发工作区的编排核心
//!
//! 模块结构：
//! - kernel: 会话控制、文件树缓存、标签页、类型声明获取、搜索替换
//! - kernel::services: 端口（运行时、文件系统、终端、代码智能、偏好）与适配器
//! - models: 数据模型（虚拟路径、挂载树、目录列表）
//! - app: 应用层（Workbench）

pub mod app;
pub mod kernel;
pub mod models;

pub use app::Workbench;
pub use kernel::SessionContext;

#[cfg(test)]
#[path = "../tests/unit/support.rs"]
pub(crate) mod test_support;
