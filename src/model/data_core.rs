//! AppState：会话核心状态，文档、树、移动记录与查询令牌的唯一归属
//!
//! 所有编辑操作都在这里串行完成：变更树、清点选择、重算表达式，
//! 一步到底再处理下一个事件。换文档时整套状态推倒重建，移动记录
//! 绝不跨文档遗留。

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::engine::EngineError;
use crate::model::mutate::{self, MoveRecord};
use crate::model::select::{collect_selected, SelectionEntry};
use crate::model::synth::synthesize;
use crate::model::tree::{build_tree, TreeNode};
use crate::utils::fs::read_json_file;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("查询执行失败: {0}")]
    Engine(#[from] EngineError),
    #[error("状态错误: {0}")]
    State(String),
}

/// 查询令牌闸门：单调递增，每次编辑都让旧令牌作废。
/// 迟到的执行结果凭令牌判定是否已被后续编辑取代。
#[derive(Debug, Default)]
pub struct QueryGate {
    current: u64,
}

impl QueryGate {
    /// 作废旧令牌并签发新令牌
    pub fn bump(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.current
    }
}

#[derive(Debug, Default)]
pub struct AppState {
    pub source_path: Option<PathBuf>,
    /// 目录模式下的目录与当前文件名
    pub dir_path: Option<PathBuf>,
    pub current_file: Option<String>,
    pub dom: Option<Value>,
    pub tree: Option<TreeNode>,
    pub moves: Vec<MoveRecord>,
    /// 路径压缩开关
    pub compress: bool,
    pub gate: QueryGate,
}

impl AppState {
    /// 用新文档替换整个会话：重建树、清空移动记录、作废旧令牌
    pub fn load_value(&mut self, dom: Value) {
        self.tree = Some(build_tree(&dom));
        self.moves.clear();
        self.dom = Some(dom);
        self.gate.bump();
        tracing::info!("文档已加载，树已重建");
    }

    /// 从文件加载JSON并切换会话文档
    pub fn load_file(&mut self, p: &Path) -> Result<(), AppError> {
        let dom = read_json_file(p)?;
        self.load_value(dom);
        self.source_path = Some(p.to_path_buf());
        tracing::info!("加载文件: {}", p.display());
        Ok(())
    }

    /// 切换叶子节点的选中状态；非叶子不可选
    pub fn toggle_selected(&mut self, addr: &str) -> bool {
        let applied = match self.tree.as_mut().and_then(|t| t.find_mut(addr)) {
            Some(node) if node.is_leaf() => {
                node.selected = !node.selected;
                true
            }
            _ => false,
        };
        if applied {
            self.gate.bump();
        }
        applied
    }

    /// 切换节点的展开状态（仅展示）
    pub fn toggle_expanded(&mut self, addr: &str) -> bool {
        match self.tree.as_mut().and_then(|t| t.find_mut(addr)) {
            Some(node) => {
                node.expanded = !node.expanded;
                true
            }
            None => false,
        }
    }

    pub fn reorder(&mut self, from: &str, to: &str, insert_after: bool) -> bool {
        let applied = match self.tree.as_mut() {
            Some(tree) => mutate::reorder(tree, from, to, insert_after),
            None => false,
        };
        if applied {
            self.gate.bump();
        }
        applied
    }

    pub fn move_into(&mut self, from: &str, target: &str) -> bool {
        let applied = match self.tree.as_mut() {
            Some(tree) => mutate::move_into(tree, &mut self.moves, from, target),
            None => false,
        };
        if applied {
            self.gate.bump();
        }
        applied
    }

    pub fn set_compress(&mut self, compress: bool) {
        if self.compress != compress {
            self.compress = compress;
            self.gate.bump();
        }
    }

    /// 当前有序选中清单
    pub fn selection(&self) -> Vec<SelectionEntry> {
        match self.tree.as_ref() {
            Some(tree) => collect_selected(tree, &self.moves),
            None => Vec::new(),
        }
    }

    /// 当前选择状态对应的 jq 表达式
    pub fn expression(&self) -> String {
        synthesize(&self.selection(), self.compress)
    }
}
