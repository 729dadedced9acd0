//! 内嵌查询引擎：解析并执行合成器产出的 jq 子集表达式
//!
//! 对外只有一个入口 `execute`，输入表达式与文档，输出结果值序列。
//! 语法接受与否以这里为准，合成器不做二次校验。

mod eval;
pub(crate) mod parser;

use serde_json::Value;
use thiserror::Error;

/// 访问链中的一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// 按键取字段
    Field(String),
    /// `[]` 逐元素迭代
    Each,
}

/// jq 子集的语法树
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.` 起步的访问链，空链即恒等
    Input(Vec<Step>),
    /// `$name` 起步的访问链
    Var(String, Vec<Step>),
    /// 对象构造，字段保持书写顺序
    Object(Vec<(String, Expr)>),
    /// 列表构造，收集内部表达式的整条流
    List(Box<Expr>),
    /// 管道
    Pipe(Box<Expr>, Box<Expr>),
    /// `expr as $name | rest` 绑定
    Bind(Box<Expr>, String, Box<Expr>),
    /// 对象浅合并
    Add(Box<Expr>, Box<Expr>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("表达式位置 {0} 出现意外字符 '{1}'")]
    UnexpectedChar(usize, char),
    #[error("表达式意外结束")]
    UnexpectedEnd,
    #[error("字符串字面量未闭合")]
    UnclosedString,
    #[error("非法转义序列")]
    InvalidEscape,
    #[error("无法对 {0} 类型做字段访问")]
    FieldOnNonObject(&'static str),
    #[error("无法迭代 {0} 类型")]
    IterateNonContainer(&'static str),
    #[error("未定义的变量 ${0}")]
    UndefinedVariable(String),
    #[error("无法合并 {0} 与 {1}")]
    MergeTypes(&'static str, &'static str),
}

/// 在文档上执行表达式，返回结果值序列（jq 的一条流可能有多个结果）
pub fn execute(expression: &str, document: &Value) -> Result<Vec<Value>, EngineError> {
    let expr = parser::parse(expression)?;
    tracing::debug!("执行表达式: {}", expression);
    eval::eval(&expr, document, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mutate::{move_into, reorder, MoveRecord};
    use crate::model::select::collect_selected;
    use crate::model::synth::synthesize;
    use crate::model::tree::{build_tree, TreeNode};
    use serde_json::json;

    /// 合成加执行一条龙，单结果直接取出
    fn project(tree: &TreeNode, records: &[MoveRecord], doc: &Value, compress: bool) -> Value {
        let entries = collect_selected(tree, records);
        let expr = synthesize(&entries, compress);
        let mut results = execute(&expr, doc).expect("合成的表达式应该能执行");
        assert_eq!(results.len(), 1, "投影表达式应该恰好产出一个结果");
        results.remove(0)
    }

    fn select(tree: &mut TreeNode, addr: &str) {
        tree.find_mut(addr).expect("节点应该存在").selected = true;
    }

    #[test]
    fn test_empty_selection_projects_whole_document() {
        let doc = json!({"a": 1, "b": [2, 3]});
        let tree = build_tree(&doc);
        assert_eq!(project(&tree, &[], &doc, true), doc);
    }

    #[test]
    fn test_deep_leaf_compressed_and_nested() {
        let doc = json!({"a": {"b": {"c": 1}}});
        let mut tree = build_tree(&doc);
        select(&mut tree, "$.a.b.c");

        assert_eq!(project(&tree, &[], &doc, true), json!({"a.b.c": 1}));
        assert_eq!(project(&tree, &[], &doc, false), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_array_template_projection() {
        let doc = json!({"items": [{"x": 1, "y": 2, "z": 9}, {"x": 3, "y": 4, "z": 8}]});
        let mut tree = build_tree(&doc);
        select(&mut tree, "$.items[].x");
        select(&mut tree, "$.items[].y");

        assert_eq!(
            project(&tree, &[], &doc, false),
            json!({"items": [{"x": 1, "y": 2}, {"x": 3, "y": 4}]})
        );
    }

    #[test]
    fn test_moved_leaf_reads_via_root_binding() {
        let doc = json!({"meta": {"owner": "甲"}, "items": [{"x": 1}, {"x": 2}]});
        let mut tree = build_tree(&doc);
        let mut records = Vec::new();
        assert!(move_into(&mut tree, &mut records, "$.meta.owner", "$.items"));
        select(&mut tree, "$.items[].x");
        select(&mut tree, "$.items[].owner");

        assert_eq!(
            project(&tree, &records, &doc, false),
            json!({"items": [{"x": 1, "owner": "甲"}, {"x": 2, "owner": "甲"}]})
        );
    }

    #[test]
    fn test_reorder_changes_only_field_order() {
        let doc = json!({"a": 1, "b": 2});
        let mut tree = build_tree(&doc);
        select(&mut tree, "$.a");
        select(&mut tree, "$.b");

        let before = project(&tree, &[], &doc, false);
        assert!(reorder(&mut tree, "$.b", "$.a", false));
        let after = project(&tree, &[], &doc, false);

        assert_eq!(before, after, "数据本身不因重排而变");
        let keys = |v: &Value| -> Vec<String> {
            v.as_object()
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default()
        };
        assert_eq!(keys(&before), vec!["a", "b"]);
        // 序列化层面键序已翻转
        let after_text = serde_json::to_string(
            &execute(&synthesize(&collect_selected(&tree, &[]), false), &doc)
                .expect("执行应该成功")[0],
        )
        .expect("序列化应该成功");
        assert_eq!(after_text, "{\"b\":2,\"a\":1}");
    }

    #[test]
    fn test_compression_toggle_preserves_data() {
        let doc = json!({"a": {"b": {"c": 1, "d": 2}}, "items": [{"x": 5}]});
        let mut tree = build_tree(&doc);
        select(&mut tree, "$.a.b.c");
        select(&mut tree, "$.items[].x");

        let entries = collect_selected(&tree, &[]);
        let on = execute(&synthesize(&entries, true), &doc).expect("压缩表达式应该能执行");
        let off = execute(&synthesize(&entries, false), &doc).expect("非压缩表达式应该能执行");

        // 两个片段浅合并成一个对象，压缩只改键的拼法
        assert_eq!(on.len(), 1);
        assert_eq!(off.len(), 1);
        assert_eq!(on[0]["a.b.c"], off[0]["a"]["b"]["c"]);
        assert_eq!(on[0]["items"], off[0]["items"], "数组片段与压缩无关");
    }

    #[test]
    fn test_plain_and_group_merge_executes() {
        let doc = json!({"name": "清单", "items": [{"x": 1}]});
        let mut tree = build_tree(&doc);
        select(&mut tree, "$.name");
        select(&mut tree, "$.items[].x");

        assert_eq!(
            project(&tree, &[], &doc, false),
            json!({"name": "清单", "items": [{"x": 1}]})
        );
    }

    #[test]
    fn test_special_keys_round_trip() {
        let doc = json!({"a b": {"c.d": 7}});
        let mut tree = build_tree(&doc);
        select(&mut tree, "$['a b']['c.d']");

        assert_eq!(project(&tree, &[], &doc, false), json!({"a b": {"c.d": 7}}));
        assert_eq!(project(&tree, &[], &doc, true), json!({"a b.c.d": 7}));
    }
}
