//! Strict decoder for textual header literals
//!
//! Accepts `None`, `True`, `False`, integers, floats (including `inf` and
//! `nan`), quoted strings, tuples, lists, dicts with string keys and
//! `array([...], dtype='...'[, shape=(...)])`. Nothing is evaluated.

use crate::error::{Error, Result};
use crate::types::{Buffer, DType, Value};
use std::collections::BTreeMap;

/// Decode one literal spanning the whole input
pub fn parse_literal(text: &str) -> Result<Value> {
    let mut parser = Parser::new(text);
    let value = parser.value()?;
    parser.skip_ws();
    if !parser.eos() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn eos(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<std::borrow::Cow<'static, str>>) -> Error {
        Error::malformed(message, self.pos)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Consume `c` after optional whitespace
    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    /// Consume an identifier-like word without moving on failure
    fn word(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('(') => self.tuple(),
            Some('[') => self.list().map(Value::List),
            Some('{') => self.dict(),
            Some('\'') | Some('"') => self.string().map(Value::Str),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                match self.word() {
                    "None" => Ok(Value::None),
                    "True" => Ok(Value::Bool(true)),
                    "False" => Ok(Value::Bool(false)),
                    "inf" => Ok(Value::Float(f64::INFINITY)),
                    "nan" => Ok(Value::Float(f64::NAN)),
                    "array" | "np.array" | "numpy.array" => self.array(),
                    word => {
                        self.pos = start;
                        Err(self.error(format!("unknown name '{word}'")))
                    }
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        let mut negative = false;
        if let Some(sign @ ('-' | '+')) = self.peek() {
            negative = sign == '-';
            self.bump();
        }
        let rest = self.rest();
        if rest.starts_with("inf") {
            self.pos += 3;
            return Ok(Value::Float(if negative { f64::NEG_INFINITY } else { f64::INFINITY }));
        }
        if rest.starts_with("nan") {
            self.pos += 3;
            return Ok(Value::Float(f64::NAN));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if let Some('-' | '+') = self.peek() {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::Int(i));
            }
        }
        text.parse::<f64>().map(Value::Float).map_err(|_| {
            self.pos = start;
            self.error(format!("invalid number '{text}'"))
        })
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| self.error("unterminated string"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        'U' => out.push(self.hex_escape(8)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char> {
        let rest = self.rest();
        let code = rest
            .get(..digits)
            .and_then(|h| u32::from_str_radix(h, 16).ok())
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid escape sequence"))?;
        self.pos += digits;
        Ok(code)
    }

    /// Comma-separated items up to `close`, trailing comma allowed
    ///
    /// Returns the items and whether any comma was seen.
    fn items(&mut self, close: char) -> Result<(Vec<Value>, bool)> {
        let mut items = Vec::new();
        let mut comma = false;
        loop {
            if self.eat(close) {
                return Ok((items, comma));
            }
            items.push(self.value()?);
            if self.eat(',') {
                comma = true;
            } else {
                self.expect(close)?;
                return Ok((items, comma));
            }
        }
    }

    fn tuple(&mut self) -> Result<Value> {
        self.expect('(')?;
        let (mut items, comma) = self.items(')')?;
        if items.len() == 1 && !comma {
            return Ok(items.remove(0));
        }
        Ok(Value::Tuple(items))
    }

    fn list(&mut self) -> Result<Vec<Value>> {
        self.expect('[')?;
        Ok(self.items(']')?.0)
    }

    fn dict(&mut self) -> Result<Value> {
        self.expect('{')?;
        let mut entries = BTreeMap::new();
        loop {
            if self.eat('}') {
                break;
            }
            self.skip_ws();
            let key = match self.peek() {
                Some('\'') | Some('"') => self.string()?,
                _ => return Err(self.error("dict keys must be strings")),
            };
            self.expect(':')?;
            let value = self.value()?;
            entries.insert(key, value);
            if !self.eat(',') {
                self.expect('}')?;
                break;
            }
        }
        Ok(Value::Dict(entries))
    }

    fn array(&mut self) -> Result<Value> {
        self.expect('(')?;
        self.skip_ws();
        let start = self.pos;
        let nested = self.list()?;
        let mut dtype = None;
        let mut shape = None;
        while self.eat(',') {
            self.skip_ws();
            if self.peek() == Some(')') {
                break;
            }
            let key_pos = self.pos;
            let key = self.word();
            self.expect('=')?;
            match key {
                "dtype" => {
                    self.skip_ws();
                    let name = self.string()?;
                    dtype = Some(DType::from_name(&name).ok_or_else(|| {
                        Error::malformed(format!("unknown dtype '{name}'"), key_pos)
                    })?);
                }
                "shape" => {
                    let dims = match self.value()? {
                        Value::Tuple(items) | Value::List(items) => items,
                        Value::Int(i) => vec![Value::Int(i)],
                        _ => return Err(Error::malformed("shape must be a tuple", key_pos)),
                    };
                    let dims: Option<Vec<usize>> = dims
                        .iter()
                        .map(|d| d.as_int().and_then(|i| usize::try_from(i).ok()))
                        .collect();
                    shape = Some(dims.ok_or_else(|| Error::malformed("invalid shape", key_pos))?);
                }
                other => {
                    return Err(Error::malformed(format!("unknown array argument '{other}'"), key_pos));
                }
            }
        }
        self.expect(')')?;

        let mut flat = Vec::new();
        let inferred = flatten(&nested, &mut flat).map_err(|m| Error::malformed(m, start))?;
        let dtype = match dtype {
            Some(d) => d,
            None => Buffer::from_values(&flat).map_or(DType::Object, |b| b.dtype()),
        };
        let shape = shape.unwrap_or(inferred);
        let buffer = Buffer::from_values_as(dtype, &flat)
            .ok_or_else(|| Error::malformed(format!("array elements do not fit dtype {dtype}"), start))?
            .reshape(&shape)
            .map_err(|e| Error::malformed(e.to_string(), start))?;
        Ok(Value::Array(buffer))
    }
}

/// Flatten nested lists into `out`, returning the rectangular shape
fn flatten(items: &[Value], out: &mut Vec<Value>) -> std::result::Result<Vec<usize>, &'static str> {
    let nested = items.iter().any(|v| matches!(v, Value::List(_)));
    if !nested {
        out.extend(items.iter().cloned());
        return Ok(vec![items.len()]);
    }
    let mut inner: Option<Vec<usize>> = None;
    for item in items {
        let Value::List(sub) = item else {
            return Err("array rows must all be lists");
        };
        let shape = flatten(sub, out)?;
        match &inner {
            Some(s) if *s != shape => return Err("array rows differ in length"),
            Some(_) => {}
            None => inner = Some(shape),
        }
    }
    let mut shape = vec![items.len()];
    shape.extend(inner.unwrap_or_default());
    Ok(shape)
}
