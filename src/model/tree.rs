//! 文档树：把解析后的 JSON 值镜像成可寻址、可变更的节点树
//!
//! 对象按文档键序产生子节点；数组只取首元素生成一代"模板子节点"
//! （地址带 `[]` 标记，表示对每个元素生效），不为每个元素建节点。
//! 无子节点的值一律视为叶子，包括空对象、空数组与标量数组。

use serde::Serialize;
use serde_json::Value;

use crate::model::path;

/// 节点类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Object,
    Array,
    Leaf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// 在父级中的键名（根节点为 `$`）
    pub key: String,
    /// 规范地址，见路径模型
    pub address: String,
    /// 节点类别
    pub kind: NodeKind,
    /// 子节点，顺序即展示顺序
    pub children: Vec<TreeNode>,
    /// 是否展开（仅影响展示，不参与合成）
    pub expanded: bool,
    /// 是否选中（仅叶子有意义）
    pub selected: bool,
    /// 源数组元素个数（仅数组节点，供展示）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_len: Option<usize>,
    /// 轻量预览文本
    pub preview: String,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// 按地址查找节点
    pub fn find(&self, addr: &str) -> Option<&TreeNode> {
        if self.address == addr {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(addr))
    }

    pub fn find_mut(&mut self, addr: &str) -> Option<&mut TreeNode> {
        if self.address == addr {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(addr))
    }

    /// 从树中摘除指定地址的节点并返回（根节点不可摘除）
    pub fn detach(&mut self, addr: &str) -> Option<TreeNode> {
        if let Some(pos) = self.children.iter().position(|c| c.address == addr) {
            return Some(self.children.remove(pos));
        }
        self.children.iter_mut().find_map(|c| c.detach(addr))
    }
}

/// 从根 Value 构建整棵文档树；任何合法 JSON 都能建树，无失败分支
pub fn build_tree(root: &Value) -> TreeNode {
    let mut node = build_node("$".to_string(), "$".to_string(), root);
    node.expanded = true;
    node
}

fn build_node(key: String, address: String, value: &Value) -> TreeNode {
    let mut children = Vec::new();
    let mut array_len = None;

    let kind = match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, child) in map {
                let child_addr = path::object_child(&address, k);
                children.push(build_node(k.clone(), child_addr, child));
            }
            NodeKind::Object
        }
        Value::Array(arr) => {
            // 模板子节点只看首元素，数组再长也只有一代子节点
            match arr.first() {
                Some(Value::Object(first)) if !first.is_empty() => {
                    array_len = Some(arr.len());
                    for (k, child) in first {
                        let child_addr = path::array_child(&address, k);
                        children.push(build_node(k.clone(), child_addr, child));
                    }
                    NodeKind::Array
                }
                _ => NodeKind::Leaf,
            }
        }
        _ => NodeKind::Leaf,
    };

    TreeNode {
        key,
        address,
        kind,
        children,
        expanded: false,
        selected: false,
        array_len,
        preview: preview_of(value),
    }
}

/// 节点预览文本（字符串截断、数字/布尔/空的简短描述）
fn preview_of(v: &Value) -> String {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if s.chars().count() > 32 {
                let truncated: String = s.chars().take(32).collect();
                format!("\"{}...\"", truncated)
            } else {
                format!("\"{}\"", s)
            }
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Object(m) => format!("{{..}} ({} keys)", m.len()),
        Value::Array(a) => format!("[..] ({} items)", a.len()),
    }
}
