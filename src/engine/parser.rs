//! jq 子集语法的递归下降解析器
//!
//! 只接受合成器会产出的语法面：恒等与字段访问链、`[]` 迭代、对象构造
//! （含裸键简写）、列表构造、管道、`as` 绑定、变量引用与 `+` 浅合并。
//! 子集之外的任何写法都是解析错误，错误里带出错位置。

use crate::engine::{EngineError, Expr, Step};

pub(crate) fn parse(input: &str) -> Result<Expr, EngineError> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    parser.skip_ws();
    let expr = parser.parse_pipe()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(expr),
        Some(c) => Err(EngineError::UnexpectedChar(parser.pos, c)),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: char) -> Result<(), EngineError> {
        match self.peek() {
            Some(c) if c == want => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(EngineError::UnexpectedChar(self.pos, c)),
            None => Err(EngineError::UnexpectedEnd),
        }
    }

    /// 吃掉关键字，要求后面不是标识符字符
    fn eat_keyword(&mut self, kw: &str) -> bool {
        let end = self.pos + kw.len();
        if end > self.chars.len() {
            return false;
        }
        if !self.chars[self.pos..end].iter().copied().eq(kw.chars()) {
            return false;
        }
        if let Some(&c) = self.chars.get(end) {
            if is_ident_part(c) {
                return false;
            }
        }
        self.pos = end;
        true
    }

    // === 按优先级分层：管道/绑定 < 合并 < 基元 ===

    fn parse_pipe(&mut self) -> Result<Expr, EngineError> {
        let first = self.parse_add()?;
        self.skip_ws();
        if self.eat_keyword("as") {
            self.skip_ws();
            self.expect('$')?;
            let name = self.parse_ident()?;
            self.skip_ws();
            self.expect('|')?;
            self.skip_ws();
            let rest = self.parse_pipe()?;
            return Ok(Expr::Bind(Box::new(first), name, Box::new(rest)));
        }
        if matches!(self.peek(), Some('|')) {
            self.pos += 1;
            self.skip_ws();
            let rest = self.parse_pipe()?;
            return Ok(Expr::Pipe(Box::new(first), Box::new(rest)));
        }
        Ok(first)
    }

    fn parse_add(&mut self) -> Result<Expr, EngineError> {
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_ws();
            if matches!(self.peek(), Some('+')) {
                self.pos += 1;
                self.skip_ws();
                let rhs = self.parse_primary()?;
                expr = Expr::Add(Box::new(expr), Box::new(rhs));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.peek() {
            Some('.') => {
                self.pos += 1;
                Ok(Expr::Input(self.parse_steps_after_dot()?))
            }
            Some('$') => {
                self.pos += 1;
                let name = self.parse_ident()?;
                Ok(Expr::Var(name, self.parse_postfix()?))
            }
            Some('{') => self.parse_object(),
            Some('[') => {
                self.pos += 1;
                self.skip_ws();
                let inner = self.parse_pipe()?;
                self.skip_ws();
                self.expect(']')?;
                Ok(Expr::List(Box::new(inner)))
            }
            Some(c) => Err(EngineError::UnexpectedChar(self.pos, c)),
            None => Err(EngineError::UnexpectedEnd),
        }
    }

    /// '.' 已被吃掉：可能是裸恒等、`.name` 链或 `.["key"]` 链
    fn parse_steps_after_dot(&mut self) -> Result<Vec<Step>, EngineError> {
        let mut steps = Vec::new();
        match self.peek() {
            Some(c) if is_ident_start(c) => steps.push(Step::Field(self.parse_ident()?)),
            Some('[') => steps.push(self.parse_bracket_step()?),
            _ => return Ok(steps),
        }
        steps.extend(self.parse_postfix()?);
        Ok(steps)
    }

    /// 紧随其后的访问链：`.name`、`["key"]`、`[]`，不允许中间有空白
    fn parse_postfix(&mut self) -> Result<Vec<Step>, EngineError> {
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some('[') => steps.push(self.parse_bracket_step()?),
                Some('.') => match self.chars.get(self.pos + 1).copied() {
                    Some(c) if is_ident_start(c) => {
                        self.pos += 1;
                        steps.push(Step::Field(self.parse_ident()?));
                    }
                    Some('[') => {
                        self.pos += 1;
                        steps.push(self.parse_bracket_step()?);
                    }
                    _ => return Ok(steps),
                },
                _ => return Ok(steps),
            }
        }
    }

    fn parse_bracket_step(&mut self) -> Result<Step, EngineError> {
        self.expect('[')?;
        self.skip_ws();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(Step::Each)
            }
            Some('"') => {
                let key = self.parse_string()?;
                self.skip_ws();
                self.expect(']')?;
                Ok(Step::Field(key))
            }
            Some(c) => Err(EngineError::UnexpectedChar(self.pos, c)),
            None => Err(EngineError::UnexpectedEnd),
        }
    }

    fn parse_object(&mut self) -> Result<Expr, EngineError> {
        self.expect('{')?;
        self.skip_ws();
        let mut fields = Vec::new();
        if matches!(self.peek(), Some('}')) {
            self.pos += 1;
            return Ok(Expr::Object(fields));
        }
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some('"') => self.parse_string()?,
                Some(c) if is_ident_start(c) => self.parse_ident()?,
                Some(c) => return Err(EngineError::UnexpectedChar(self.pos, c)),
                None => return Err(EngineError::UnexpectedEnd),
            };
            self.skip_ws();
            if matches!(self.peek(), Some(':')) {
                self.pos += 1;
                self.skip_ws();
                // 对象值不带管道，管道要括在列表里
                let value = self.parse_add()?;
                fields.push((key, value));
            } else {
                // 裸键简写 {k} 等价于 {k: .k}
                let value = Expr::Input(vec![Step::Field(key.clone())]);
                fields.push((key, value));
            }
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some('}') => {
                    self.pos += 1;
                    return Ok(Expr::Object(fields));
                }
                Some(c) => return Err(EngineError::UnexpectedChar(self.pos, c)),
                None => return Err(EngineError::UnexpectedEnd),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, EngineError> {
        match self.peek() {
            Some(c) if is_ident_start(c) => {}
            Some(c) => return Err(EngineError::UnexpectedChar(self.pos, c)),
            None => return Err(EngineError::UnexpectedEnd),
        }
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_part(c)) {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_string(&mut self) -> Result<String, EngineError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(EngineError::UnclosedString),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let digit = self
                                .bump()
                                .and_then(|c| c.to_digit(16))
                                .ok_or(EngineError::InvalidEscape)?;
                            code = code * 16 + digit;
                        }
                        out.push(char::from_u32(code).ok_or(EngineError::InvalidEscape)?);
                    }
                    _ => return Err(EngineError::InvalidEscape),
                },
                Some(c) => out.push(c),
            }
        }
    }
}
