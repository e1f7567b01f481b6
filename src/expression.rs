//! The `%[...]` / `%if` expression sublanguage.
//!
//! Recursive descent with a one-token lookahead.  Macro references are
//! *not* expanded while lexing: a `%` inside a number or quoted string
//! swallows the whole construct into the token text, and the token is
//! expanded through the caller-supplied callback only when its value is
//! actually needed.  Branches that short-circuiting rules skip are
//! parsed in discard mode, so their side effects (think
//! `%{expand:%%global ...}`) never run.

use crate::error::ExpandError;
use crate::evr::evr_cmp;
use crate::macros::find_macro_end;
use color_eyre::Result;
use smartstring::alias::String;
use std::cmp::Ordering;
use tracing::debug;

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
	Int(i64),
	Str(String),
	Ver(String),
}

impl Value {
	/// Falsy: integer `0`, or a string that is empty or `"0"`.
	pub fn truthy(&self) -> bool {
		match self {
			Self::Int(i) => *i != 0,
			Self::Str(s) => !(s.is_empty() || s.as_str() == "0"),
			Self::Ver(_) => true,
		}
	}
}

impl std::fmt::Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Int(i) => write!(f, "{i}"),
			Self::Str(s) | Self::Ver(s) => write!(f, "{s}"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok {
	Eof,
	Add,
	Minus,
	Mul,
	Div,
	OpenP,
	CloseP,
	Eq,
	NEq,
	Not,
	Le,
	Lt,
	Ge,
	Gt,
	And,
	Or,
	Question,
	Colon,
	Integer,
	Str,
	Version,
}

struct ExprParser<'a, F> {
	rest: &'a str,
	next: Tok,
	/// Raw text of the current Integer/Str/Version token, macros intact.
	text: &'a str,
	expand: F,
	/// When > 0, operand tokens are not expanded and operators skip type
	/// checks; used for untaken branches.
	discard: u32,
}

fn syntax_err<T>(msg: &str) -> Result<T> {
	Err(ExpandError::Syntax(msg.into()).into())
}

impl<'a, F: FnMut(&str) -> Result<std::string::String>> ExprParser<'a, F> {
	fn new(text: &'a str, expand: F) -> Self {
		Self { rest: text, next: Tok::Eof, text: "", expand, discard: 0 }
	}

	/// Scan the length of a number-ish or quoted token starting at
	/// `self.rest`, letting `%` swallow whole macro constructs.
	fn scan_value(&self, quoted: bool) -> Result<usize> {
		let s = self.rest;
		let mut i = if quoted { 1 } else { 0 };
		while i < s.len() {
			let c = s[i..].chars().next().unwrap_or('\0');
			if c == '%' {
				i += find_macro_end(&s[i..]);
				continue;
			}
			if quoted {
				if c == '"' {
					return Ok(i + 1);
				}
				if c == '\n' {
					break;
				}
				if c == '\\' {
					let escaped = s[i + 1..].chars().next().map_or(0, char::len_utf8);
					i += 1 + escaped;
					continue;
				}
			} else if !c.is_ascii_digit() {
				return Ok(i);
			}
			i += c.len_utf8();
		}
		if quoted {
			return syntax_err("unterminated string in expression");
		}
		Ok(i)
	}

	fn rd_token(&mut self) -> Result<()> {
		self.rest = self.rest.trim_start();
		self.text = "";
		let Some(c) = self.rest.chars().next() else {
			self.next = Tok::Eof;
			return Ok(());
		};
		let mut len = 1;
		self.next = match c {
			'+' => Tok::Add,
			'-' => Tok::Minus,
			'*' => Tok::Mul,
			'/' => Tok::Div,
			'(' => Tok::OpenP,
			')' => Tok::CloseP,
			'?' => Tok::Question,
			':' => Tok::Colon,
			'=' => {
				if self.rest[1..].starts_with('=') {
					len = 2;
					Tok::Eq
				} else {
					return syntax_err("syntax error while parsing ==");
				}
			}
			'!' => {
				if self.rest[1..].starts_with('=') {
					len = 2;
					Tok::NEq
				} else {
					Tok::Not
				}
			}
			'<' => {
				if self.rest[1..].starts_with('=') {
					len = 2;
					Tok::Le
				} else {
					Tok::Lt
				}
			}
			'>' => {
				if self.rest[1..].starts_with('=') {
					len = 2;
					Tok::Ge
				} else {
					Tok::Gt
				}
			}
			'&' => {
				if self.rest[1..].starts_with('&') {
					len = 2;
					Tok::And
				} else {
					return syntax_err("syntax error while parsing &&");
				}
			}
			'|' => {
				if self.rest[1..].starts_with('|') {
					len = 2;
					Tok::Or
				} else {
					return syntax_err("syntax error while parsing ||");
				}
			}
			'"' => {
				len = self.scan_value(true)?;
				self.text = &self.rest[1..len - 1];
				Tok::Str
			}
			'v' if self.rest[1..].starts_with('"') => {
				self.rest = &self.rest[1..];
				len = self.scan_value(true)?;
				self.text = &self.rest[1..len - 1];
				Tok::Version
			}
			_ if c.is_ascii_digit() || c == '%' => {
				len = self.scan_value(false)?;
				if len == 0 {
					return syntax_err("parse error in expression");
				}
				self.text = &self.rest[..len];
				Tok::Integer
			}
			_ if c.is_alphabetic() => {
				return syntax_err("bare words are no longer supported, please use \"...\"");
			}
			_ => return syntax_err("parse error in expression"),
		};
		self.rest = &self.rest[len..];
		debug!("rd_token: {:?} `{}`", self.next, self.text);
		Ok(())
	}

	fn expand_text(&mut self) -> Result<std::string::String> {
		(self.expand)(self.text)
	}

	fn integer_value(&mut self) -> Result<Value> {
		if self.discard > 0 {
			return Ok(Value::Int(0));
		}
		let expanded = self.expand_text()?;
		let tmp = expanded.trim();
		if tmp.is_empty() {
			return Ok(Value::Int(0));
		}
		let digits = tmp.strip_prefix('-').unwrap_or(tmp);
		if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
			return match tmp.parse() {
				Ok(i) => Ok(Value::Int(i)),
				Err(_) => syntax_err("integer out of range"),
			};
		}
		if tmp.chars().next().is_some_and(char::is_alphabetic) {
			return syntax_err("macro expansion returned a bare word, please use \"...\"");
		}
		syntax_err("macro expansion did not return an integer")
	}

	fn do_primary(&mut self) -> Result<Value> {
		match self.next {
			Tok::OpenP => {
				self.rd_token()?;
				let v = self.do_ternary()?;
				if self.next != Tok::CloseP {
					return syntax_err("unmatched (");
				}
				self.rd_token()?;
				Ok(v)
			}
			Tok::Integer => {
				let v = self.integer_value()?;
				self.rd_token()?;
				Ok(v)
			}
			Tok::Str => {
				let v = if self.discard > 0 { Value::Str(String::new()) } else { Value::Str(self.expand_text()?.into()) };
				self.rd_token()?;
				Ok(v)
			}
			Tok::Version => {
				let v = if self.discard > 0 {
					Value::Ver("0".into())
				} else {
					let expanded = self.expand_text()?;
					if expanded.is_empty() {
						return syntax_err("invalid version");
					}
					Value::Ver(expanded.into())
				};
				self.rd_token()?;
				Ok(v)
			}
			Tok::Eof => syntax_err("unexpected end of expression"),
			_ => syntax_err("syntax error in expression"),
		}
	}

	fn do_unary(&mut self) -> Result<Value> {
		match self.next {
			Tok::Minus => {
				self.rd_token()?;
				let v = self.do_unary()?;
				if self.discard > 0 {
					return Ok(v);
				}
				let Value::Int(i) = v else { return syntax_err("- only on numbers") };
				Ok(Value::Int(-i))
			}
			Tok::Not => {
				self.rd_token()?;
				let v = self.do_unary()?;
				Ok(Value::Int(i64::from(!v.truthy())))
			}
			_ => self.do_primary(),
		}
	}

	fn do_multiply_divide(&mut self) -> Result<Value> {
		let mut v = self.do_unary()?;
		while matches!(self.next, Tok::Mul | Tok::Div) {
			let op = self.next;
			self.rd_token()?;
			let rhs = self.do_unary()?;
			if self.discard > 0 {
				continue;
			}
			let (Value::Int(a), Value::Int(b)) = (&v, &rhs) else {
				return syntax_err("don't use `*` or `/` for strings");
			};
			v = if op == Tok::Mul {
				Value::Int(a * b)
			} else {
				if *b == 0 {
					return syntax_err("division by zero");
				}
				// floor division
				let q = a / b;
				Value::Int(if a % b != 0 && (*a < 0) != (*b < 0) { q - 1 } else { q })
			};
		}
		Ok(v)
	}

	fn do_add_subtract(&mut self) -> Result<Value> {
		let mut v = self.do_multiply_divide()?;
		while matches!(self.next, Tok::Add | Tok::Minus) {
			let op = self.next;
			self.rd_token()?;
			let rhs = self.do_multiply_divide()?;
			if self.discard > 0 {
				continue;
			}
			v = match (&v, &rhs) {
				(Value::Int(a), Value::Int(b)) => Value::Int(if op == Tok::Add { a + b } else { a - b }),
				(Value::Str(a), Value::Str(b)) => {
					if op != Tok::Add {
						return syntax_err("don't use `-` for strings");
					}
					let mut s = a.clone();
					s.push_str(b);
					Value::Str(s)
				}
				_ => return syntax_err("types must match"),
			};
		}
		Ok(v)
	}

	fn do_relational(&mut self) -> Result<Value> {
		let v = self.do_add_subtract()?;
		if !matches!(self.next, Tok::Eq | Tok::NEq | Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge) {
			return Ok(v);
		}
		let op = self.next;
		self.rd_token()?;
		let rhs = self.do_add_subtract()?;
		if self.discard > 0 {
			return Ok(Value::Int(0));
		}
		let ord = match (&v, &rhs) {
			(Value::Int(a), Value::Int(b)) => a.cmp(b),
			(Value::Str(a), Value::Str(b)) => a.cmp(b),
			(Value::Ver(a), Value::Ver(b)) => evr_cmp(a, b),
			_ => {
				// mixed types never compare equal; ordering them is an error
				return match op {
					Tok::Eq => Ok(Value::Int(0)),
					Tok::NEq => Ok(Value::Int(1)),
					_ => syntax_err("types must match for <, <=, > and >="),
				};
			}
		};
		let accept = match op {
			Tok::Eq => ord == Ordering::Equal,
			Tok::NEq => ord != Ordering::Equal,
			Tok::Lt => ord == Ordering::Less,
			Tok::Le => ord != Ordering::Greater,
			Tok::Gt => ord == Ordering::Greater,
			Tok::Ge => ord != Ordering::Less,
			_ => unreachable!("relational op checked above"),
		};
		Ok(Value::Int(i64::from(accept)))
	}

	fn do_logical_and(&mut self) -> Result<Value> {
		let mut v = self.do_relational()?;
		while self.next == Tok::And {
			self.rd_token()?;
			if v.truthy() || self.discard > 0 {
				v = self.do_relational()?;
			} else {
				self.discard += 1;
				let r = self.do_relational();
				self.discard -= 1;
				r?;
			}
		}
		Ok(v)
	}

	fn do_logical_or(&mut self) -> Result<Value> {
		let mut v = self.do_logical_and()?;
		while self.next == Tok::Or {
			self.rd_token()?;
			if !v.truthy() || self.discard > 0 {
				v = self.do_logical_and()?;
			} else {
				self.discard += 1;
				let r = self.do_logical_and();
				self.discard -= 1;
				r?;
			}
		}
		Ok(v)
	}

	fn do_ternary(&mut self) -> Result<Value> {
		let cond = self.do_logical_or()?;
		if self.next != Tok::Question {
			return Ok(cond);
		}
		self.rd_token()?;
		let taken = cond.truthy();
		let lhs = self.branch(taken)?;
		if self.next != Tok::Colon {
			return syntax_err("syntax error in expression");
		}
		self.rd_token()?;
		let rhs = self.branch(!taken)?;
		Ok(if taken { lhs } else { rhs })
	}

	fn branch(&mut self, live: bool) -> Result<Value> {
		if live {
			self.do_ternary()
		} else {
			self.discard += 1;
			let r = self.do_ternary();
			self.discard -= 1;
			r
		}
	}
}

/// Evaluate an expression, running every operand through `expand` first.
pub fn eval_expr_with<F>(text: &str, expand: F) -> Result<Value>
where
	F: FnMut(&str) -> Result<std::string::String>,
{
	let mut p = ExprParser::new(text, expand);
	p.rd_token()?;
	let v = p.do_ternary()?;
	if p.next != Tok::Eof {
		return syntax_err("syntax error in expression");
	}
	Ok(v)
}

/// Standalone evaluation: operands are taken verbatim.
pub fn eval_expr(text: &str) -> Result<Value> {
	eval_expr_with(text, |s| Ok(s.to_owned()))
}
