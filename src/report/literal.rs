//! Best-effort literal coercion of CSV cells
//!
//! A cell is tried against an ordered set of typed parsers:
//!
//! 1. `None` → null
//! 2. `True` / `False` (and lowercase `true` / `false`) → boolean
//! 3. integer: optional sign, no leading zeros on a nonzero value
//! 4. decimal: optional sign, fraction and/or exponent; must be exact
//! 5. quoted string literal, `'x'` or `"x"`
//! 6. bracketed list `[..]` or tuple `(..)`, elements parsed recursively
//!
//! Spaces and tabs around a cell are ignored and digits may be grouped with
//! single underscores (`1_000`). Containers nest at most [`MAX_DEPTH`]
//! levels. Anything else is kept as the original text. Coercion never fails.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

/// Deepest container nesting that is still coerced
pub const MAX_DEPTH: usize = 64;

/// A decoded CSV cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// `None`
    Null,
    /// Boolean literal
    Bool(bool),
    /// Integer that fits in 64 bits
    Integer(i64),
    /// Decimal or out-of-range integer
    Decimal(Decimal),
    /// Text, either quoted literal content or an unparsed cell
    Text(String),
    /// `[..]` literal
    List(Vec<CellValue>),
    /// `(..)` literal
    Tuple(Vec<CellValue>),
}

impl CellValue {
    /// Whether the cell is null
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Text content, if this is a text cell
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Decimal(d) => match d.to_f64() {
                Some(f) => serializer.serialize_f64(f),
                None => serializer.serialize_str(&d.to_string()),
            },
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::List(items) | CellValue::Tuple(items) => items.serialize(serializer),
        }
    }
}

/// String form used for synthetic keys
///
/// Booleans print as `True`/`False`, decimals drop trailing zeros but keep
/// one fractional digit, and containers print their elements with quoted
/// strings: `[1, 'a']`, `(1,)`.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("None"),
            CellValue::Bool(true) => f.write_str("True"),
            CellValue::Bool(false) => f.write_str("False"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Decimal(d) => {
                let s = d.normalize().to_string();
                if s.contains('.') {
                    f.write_str(&s)
                } else {
                    write!(f, "{s}.0")
                }
            }
            CellValue::Text(s) => f.write_str(s),
            CellValue::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            CellValue::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[CellValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        match item {
            CellValue::Text(s) => write_quoted(f, s)?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    write!(f, "{quote}")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c if c == quote => write!(f, "\\{c}")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "{quote}")
}

/// Coerce one raw cell
pub fn coerce(raw: &str) -> CellValue {
    let mut parser = Parser::new(raw.trim_matches([' ', '\t']));
    match parser.value() {
        Some(value) if parser.at_end() => value,
        _ => CellValue::Text(raw.to_string()),
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos == self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start_matches([' ', '\t']);
        self.pos = self.input.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<CellValue> {
        match self.peek()? {
            '[' | '(' => self.nested(),
            '\'' | '"' => self.quoted(),
            c if c == '+' || c == '-' || c == '.' || c.is_ascii_digit() => self.number(),
            _ => self.keyword(),
        }
    }

    fn nested(&mut self) -> Option<CellValue> {
        if self.depth >= MAX_DEPTH {
            return None;
        }
        self.depth += 1;
        let value = if self.peek() == Some('[') {
            self.sequence('[', ']').map(CellValue::List)
        } else {
            self.parenthesized()
        };
        self.depth -= 1;
        value
    }

    fn keyword(&mut self) -> Option<CellValue> {
        let word_len = self
            .rest()
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(self.rest().len());
        let value = match &self.rest()[..word_len] {
            "None" => CellValue::Null,
            "True" | "true" => CellValue::Bool(true),
            "False" | "false" => CellValue::Bool(false),
            _ => return None,
        };
        self.pos += word_len;
        Some(value)
    }

    fn number(&mut self) -> Option<CellValue> {
        let bytes = self.rest().as_bytes();
        let negative = bytes.first() == Some(&b'-');
        let mut i = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

        let (end, int_digits) = digit_run(bytes, i);
        i = end;

        let mut frac_digits = String::new();
        let mut has_dot = false;
        if bytes.get(i) == Some(&b'.') {
            has_dot = true;
            let (end, digits) = digit_run(bytes, i + 1);
            i = end;
            frac_digits = digits;
        }

        if int_digits.is_empty() && frac_digits.is_empty() {
            return None;
        }

        let mut exponent = None;
        if matches!(bytes.get(i), Some(b'e' | b'E')) {
            let mut j = i + 1;
            let exp_negative = bytes.get(j) == Some(&b'-');
            if matches!(bytes.get(j), Some(b'+' | b'-')) {
                j += 1;
            }
            let (end, digits) = digit_run(bytes, j);
            let magnitude: i64 = digits.parse().ok()?;
            exponent = Some(if exp_negative { -magnitude } else { magnitude });
            i = end;
        }

        let value = if !has_dot && exponent.is_none() {
            if int_digits.starts_with('0') && int_digits.bytes().any(|b| b != b'0') {
                return None;
            }
            let signed = if negative {
                format!("-{int_digits}")
            } else {
                int_digits.clone()
            };
            match signed.parse::<i64>() {
                Ok(n) => CellValue::Integer(n),
                Err(_) => CellValue::Decimal(exact_decimal(negative, &int_digits, "", 0)?),
            }
        } else {
            CellValue::Decimal(exact_decimal(
                negative,
                &int_digits,
                &frac_digits,
                exponent.unwrap_or(0),
            )?)
        };

        self.pos += i;
        Some(value)
    }

    fn quoted(&mut self) -> Option<CellValue> {
        let quote = self.peek()?;
        let mut out = String::new();
        let mut chars = self.rest().char_indices().skip(1);

        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => {
                    let (_, escaped) = chars.next()?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                '\n' => return None,
                c if c == quote => {
                    self.pos += idx + c.len_utf8();
                    return Some(CellValue::Text(out));
                }
                c => out.push(c),
            }
        }
        None
    }

    fn parenthesized(&mut self) -> Option<CellValue> {
        self.eat('(');
        self.skip_ws();
        if self.eat(')') {
            return Some(CellValue::Tuple(Vec::new()));
        }
        let first = self.value()?;
        self.skip_ws();
        if self.eat(')') {
            // `(x)` is just `x`
            return Some(first);
        }
        if !self.eat(',') {
            return None;
        }
        let mut items = vec![first];
        self.items_until(')', &mut items)?;
        Some(CellValue::Tuple(items))
    }

    fn sequence(&mut self, open: char, close: char) -> Option<Vec<CellValue>> {
        if !self.eat(open) {
            return None;
        }
        let mut items = Vec::new();
        self.items_until(close, &mut items)?;
        Some(items)
    }

    /// Comma-separated values up to and including `close`; a trailing comma
    /// is allowed
    fn items_until(&mut self, close: char, items: &mut Vec<CellValue>) -> Option<()> {
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Some(());
            }
            items.push(self.value()?);
            self.skip_ws();
            if !self.eat(',') {
                return self.eat(close).then_some(());
            }
        }
    }
}

/// Digits starting at `start`, allowing single underscores between digits
fn digit_run(bytes: &[u8], start: usize) -> (usize, String) {
    let mut digits = String::new();
    let mut i = start;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'0'..=b'9' => digits.push(char::from(b)),
            b'_' if !digits.is_empty() && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {}
            _ => break,
        }
        i += 1;
    }
    (i, digits)
}

/// Decimal equal to `int_digits.frac_digits × 10^exponent`
///
/// Returns `None` when the value needs more than 28 fractional digits or
/// does not fit in 96 bits, instead of rounding.
fn exact_decimal(
    negative: bool,
    int_digits: &str,
    frac_digits: &str,
    exponent: i64,
) -> Option<Decimal> {
    let digits = format!("{int_digits}{frac_digits}");
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some(Decimal::ZERO);
    }
    let lead = (digits.len() - significant.len()) as i64;

    // Position of the decimal point within `digits`
    let point = (int_digits.len() as i64).checked_add(exponent)?;
    let magnitude = point - lead;
    if !(-28..=29).contains(&magnitude) {
        return None;
    }

    let plain = if point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else if point as usize >= digits.len() {
        format!("{digits}{}", "0".repeat(point as usize - digits.len()))
    } else {
        let (whole, frac) = digits.split_at(point as usize);
        format!("{whole}.{frac}")
    };

    let mut trimmed = plain.trim_start_matches('0');
    if trimmed.contains('.') {
        trimmed = trimmed.trim_end_matches('0').trim_end_matches('.');
    }
    let text = match (negative, trimmed.starts_with('.')) {
        (true, true) => format!("-0{trimmed}"),
        (true, false) => format!("-{trimmed}"),
        (false, true) => format!("0{trimmed}"),
        (false, false) => trimmed.to_string(),
    };
    Decimal::from_str_exact(&text).ok()
}
