//! 表格渲染：把查询结果转成文本表格
//!
//! 对象数组渲染为一张表，嵌套数组跨行拼接后递归渲染为带标题的子表，
//! 单个对象的标量字段渲染为单行表。找不到可成表的数据时返回 None，
//! 由调用方退回 JSON 展示。

use serde_json::Value;
use unicode_width::UnicodeWidthStr;

/// 渲染执行结果为文本表格；无可成表数据时返回None
pub fn render(value: &Value) -> Option<String> {
    let mut out = String::new();
    render_level(&mut out, "", value);
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// 按层级递归渲染：数组成表，对象先递归嵌套字段再汇总标量
fn render_level(out: &mut String, title: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return;
            }
            if let Some(first) = items[0].as_object() {
                render_array_table(out, title, items);
                // 同名嵌套数组跨行拼接成一张子表，键序取首元素
                for key in first.keys() {
                    let mut nested: Vec<Value> = Vec::new();
                    for item in items {
                        if let Some(Value::Array(arr)) = item.get(key) {
                            nested.extend(arr.iter().cloned());
                        }
                    }
                    if !nested.is_empty() {
                        render_level(out, key, &Value::Array(nested));
                    }
                }
            } else {
                render_primitive_array(out, title, items);
            }
        }
        Value::Object(obj) => {
            let mut scalars: Vec<(&str, String)> = Vec::new();
            for (key, val) in obj {
                match val {
                    Value::Array(_) | Value::Object(_) => render_level(out, key, val),
                    other => scalars.push((key.as_str(), format_cell(other))),
                }
            }
            if !scalars.is_empty() {
                let headers: Vec<&str> = scalars.iter().map(|(k, _)| *k).collect();
                let row: Vec<String> = scalars.into_iter().map(|(_, v)| v).collect();
                write_title(out, title);
                draw_table(out, &headers, &[row]);
            }
        }
        _ => {}
    }
}

/// 对象数组：表头取首元素的标量键，每个对象元素贡献一行
fn render_array_table(out: &mut String, title: &str, items: &[Value]) {
    let first = match items.first().and_then(Value::as_object) {
        Some(obj) => obj,
        None => return,
    };

    let headers: Vec<&str> = first
        .iter()
        .filter(|(_, v)| !matches!(v, Value::Array(_) | Value::Object(_)))
        .map(|(k, _)| k.as_str())
        .collect();
    if headers.is_empty() {
        return;
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for item in items {
        if let Some(obj) = item.as_object() {
            let row = headers
                .iter()
                .map(|h| format_cell(obj.get(*h).unwrap_or(&Value::Null)))
                .collect();
            rows.push(row);
        }
    }

    write_title(out, title);
    draw_table(out, &headers, &rows);
}

/// 基本类型数组：单列表格，无标题时以 values 代替
fn render_primitive_array(out: &mut String, title: &str, items: &[Value]) {
    if items.is_empty() {
        return;
    }
    let title = if title.is_empty() { "values" } else { title };
    write_title(out, title);

    let rows: Vec<Vec<String>> = items.iter().map(|v| vec![format_cell(v)]).collect();
    draw_table(out, &[title], &rows);
}

fn write_title(out: &mut String, title: &str) {
    if !title.is_empty() {
        out.push_str(&format!("\n── {} ──\n", title));
    }
}

// === 表格绘制 ===

/// 画一张框线表格，列宽按显示宽度计算
fn draw_table(out: &mut String, headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| UnicodeWidthStr::width(*h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(UnicodeWidthStr::width(cell.as_str()));
            }
        }
    }

    draw_border(out, &widths, '┌', '┬', '┐');
    draw_row(out, &widths, headers.iter().copied());
    draw_border(out, &widths, '├', '┼', '┤');
    for row in rows {
        draw_row(out, &widths, row.iter().map(String::as_str));
    }
    draw_border(out, &widths, '└', '┴', '┘');
}

fn draw_border(out: &mut String, widths: &[usize], left: char, mid: char, right: char) {
    out.push(left);
    for (i, w) in widths.iter().enumerate() {
        if i > 0 {
            out.push(mid);
        }
        for _ in 0..w + 2 {
            out.push('─');
        }
    }
    out.push(right);
    out.push('\n');
}

fn draw_row<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    out.push('│');
    for (i, cell) in cells.enumerate() {
        let w = widths.get(i).copied().unwrap_or(0);
        let pad = w.saturating_sub(UnicodeWidthStr::width(cell));
        out.push(' ');
        out.push_str(cell);
        for _ in 0..pad {
            out.push(' ');
        }
        out.push(' ');
        out.push('│');
    }
    out.push('\n');
}

/// 单元格文本：null字面量、整数值浮点去小数点、布尔true/false
fn format_cell(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f)
                if n.as_i64().is_none()
                    && n.as_u64().is_none()
                    && f.is_finite()
                    && f.fract() == 0.0 =>
            {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_of_objects_renders_table() {
        let data = json!([
            {"name": "甲", "age": 30},
            {"name": "乙", "age": 25}
        ]);

        let table = render(&data).expect("对象数组应该能成表");
        assert!(table.contains("name"), "表头应该包含name");
        assert!(table.contains("age"), "表头应该包含age");
        assert!(table.contains("甲"), "表格应该包含数据行");
        assert!(table.contains("乙"), "表格应该包含第二行");
        assert!(table.starts_with('┌'), "表格应该以框线开头");
    }

    #[test]
    fn test_headers_follow_first_element_key_order() {
        let data = json!([{"b": 1, "a": 2}]);

        let table = render(&data).expect("应该成表");
        let b_pos = table.find(" b ").expect("表头应该包含b");
        let a_pos = table.find(" a ").expect("表头应该包含a");
        assert!(b_pos < a_pos, "表头应该保持首元素的键序");
    }

    #[test]
    fn test_nested_arrays_concatenated_across_rows() {
        let data = json!([
            {"id": 1, "tags": [{"t": "x"}]},
            {"id": 2, "tags": [{"t": "y"}]}
        ]);

        let table = render(&data).expect("应该成表");
        assert_eq!(
            table.matches("── tags ──").count(),
            1,
            "嵌套数组应该跨行拼接成同一张子表"
        );
        assert!(table.contains("x") && table.contains("y"), "子表应该包含所有行的数据");
    }

    #[test]
    fn test_single_object_scalars_as_one_row() {
        let data = json!({"name": "测试", "count": 3, "meta": {"k": "v"}});

        let table = render(&data).expect("应该成表");
        assert!(table.contains("── meta ──"), "嵌套对象应该渲染为带标题的子表");
        assert!(table.contains("name"), "标量字段应该出现在汇总表");
        assert!(table.contains("测试"), "标量值应该出现在汇总表");
    }

    #[test]
    fn test_primitive_array_uses_values_title() {
        let data = json!([1, 2, 3]);

        let table = render(&data).expect("应该成表");
        assert!(table.contains("── values ──"), "无标题的基本类型数组应该用values标题");
        assert!(table.contains("1") && table.contains("3"), "每个元素应该占一行");
    }

    #[test]
    fn test_untabular_data_yields_none() {
        assert!(render(&json!([])).is_none(), "空数组不可成表");
        assert!(render(&json!("纯字符串")).is_none(), "标量不可成表");
        assert!(render(&json!(42)).is_none(), "数字不可成表");
    }

    #[test]
    fn test_cell_formatting() {
        assert_eq!(format_cell(&json!(null)), "null");
        assert_eq!(format_cell(&json!(3.0)), "3", "整数值浮点应该去掉小数点");
        assert_eq!(format_cell(&json!(3.5)), "3.5");
        assert_eq!(format_cell(&json!(true)), "true");
        assert_eq!(format_cell(&json!("文本")), "文本");
    }

    #[test]
    fn test_missing_key_in_later_rows_renders_null() {
        let data = json!([
            {"a": 1, "b": 2},
            {"a": 3}
        ]);

        let table = render(&data).expect("应该成表");
        assert!(table.contains("null"), "后续行缺失的键应该渲染为null");
    }

    #[test]
    fn test_wide_characters_align_borders() {
        let data = json!([{"k": "宽字符串"}, {"k": "短"}]);

        let table = render(&data).expect("应该成表");
        let widths: Vec<usize> = table
            .lines()
            .filter(|l| !l.is_empty())
            .map(UnicodeWidthStr::width)
            .collect();
        assert!(
            widths.windows(2).all(|w| w[0] == w[1]),
            "每行的显示宽度应该一致: {:?}",
            widths
        );
    }
}
