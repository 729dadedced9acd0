//! jq筛选器工具库
//!
//! 提供JSON文档树构建、可视化选择编辑、jq表达式合成与执行功能
//! 树上点选字段，表达式实时生成，随改随查

pub mod engine;
pub mod model;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use model::data_core::{AppError, AppState};
pub use model::tree::{build_tree, NodeKind, TreeNode};
