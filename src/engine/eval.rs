//! 流式求值器：每个表达式把一个输入值映射成一串输出值
//!
//! 管道做 flat_map；`[]` 逐元素展开；对象构造对各字段的流取笛卡尔积，
//! 后面的字段变化更快；字段访问落在 null 或缺失键上得 null，落在其他
//! 非对象值上报错；`+` 只做对象浅合并，键冲突右侧胜出。字段顺序全程
//! 由构造顺序保持。

use serde_json::{Map, Value};

use crate::engine::{EngineError, Expr, Step};

/// 变量作用域链，`as` 绑定逐层嵌套
pub(crate) struct Env<'a> {
    name: &'a str,
    value: &'a Value,
    parent: Option<&'a Env<'a>>,
}

impl<'a> Env<'a> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        if self.name == name {
            Some(self.value)
        } else {
            self.parent.and_then(|p| p.lookup(name))
        }
    }
}

pub(crate) fn eval(expr: &Expr, input: &Value, env: Option<&Env<'_>>) -> Result<Vec<Value>, EngineError> {
    match expr {
        Expr::Input(steps) => apply_steps(vec![input.clone()], steps),
        Expr::Var(name, steps) => {
            let bound = env
                .and_then(|e| e.lookup(name))
                .ok_or_else(|| EngineError::UndefinedVariable(name.clone()))?;
            apply_steps(vec![bound.clone()], steps)
        }
        Expr::Object(fields) => {
            let mut acc: Vec<Map<String, Value>> = vec![Map::new()];
            for (key, value_expr) in fields {
                let values = eval(value_expr, input, env)?;
                let mut next = Vec::with_capacity(acc.len() * values.len());
                for obj in &acc {
                    for v in &values {
                        let mut obj = obj.clone();
                        obj.insert(key.clone(), v.clone());
                        next.push(obj);
                    }
                }
                acc = next;
            }
            Ok(acc.into_iter().map(Value::Object).collect())
        }
        Expr::List(inner) => Ok(vec![Value::Array(eval(inner, input, env)?)]),
        Expr::Pipe(lhs, rhs) => {
            let mut out = Vec::new();
            for v in eval(lhs, input, env)? {
                out.extend(eval(rhs, &v, env)?);
            }
            Ok(out)
        }
        Expr::Bind(source, name, body) => {
            let mut out = Vec::new();
            for bound in eval(source, input, env)? {
                let scope = Env {
                    name: name.as_str(),
                    value: &bound,
                    parent: env,
                };
                // 绑定体仍以原输入为当前值
                out.extend(eval(body, input, Some(&scope))?);
            }
            Ok(out)
        }
        Expr::Add(lhs, rhs) => {
            let left = eval(lhs, input, env)?;
            let right = eval(rhs, input, env)?;
            let mut out = Vec::with_capacity(left.len() * right.len());
            for a in &left {
                for b in &right {
                    out.push(merge(a, b)?);
                }
            }
            Ok(out)
        }
    }
}

/// 对流中每个值依次应用访问链
fn apply_steps(start: Vec<Value>, steps: &[Step]) -> Result<Vec<Value>, EngineError> {
    let mut stream = start;
    for step in steps {
        let mut next = Vec::with_capacity(stream.len());
        for v in stream {
            match step {
                Step::Field(key) => next.push(field_access(&v, key)?),
                Step::Each => next.extend(iterate(&v)?),
            }
        }
        stream = next;
    }
    Ok(stream)
}

fn field_access(v: &Value, key: &str) -> Result<Value, EngineError> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        other => Err(EngineError::FieldOnNonObject(type_name(other))),
    }
}

fn iterate(v: &Value) -> Result<Vec<Value>, EngineError> {
    match v {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map.values().cloned().collect()),
        other => Err(EngineError::IterateNonContainer(type_name(other))),
    }
}

/// 对象浅合并：保持左侧键序，右侧新键追加，冲突键右侧覆盖
fn merge(a: &Value, b: &Value) -> Result<Value, EngineError> {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            let mut out = left.clone();
            for (k, v) in right {
                out.insert(k.clone(), v.clone());
            }
            Ok(Value::Object(out))
        }
        (a, b) => Err(EngineError::MergeTypes(type_name(a), type_name(b))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
