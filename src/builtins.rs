//! Built-in macro operators and the opaque-value type they produce.

use crate::macros::MacroRegistry;
use smartstring::alias::String;

/// A chunk of expanded output.  `Opaque` text comes out of
/// `%{quote:...}` and is never split on whitespace when the argument
/// splitter walks over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
	Lit(String),
	Opaque(String),
}

impl Piece {
	pub fn text(&self) -> &str {
		match self {
			Self::Lit(s) | Self::Opaque(s) => s,
		}
	}
}

/// Names handled by [`eval_builtin`] (plus `dnl`, which the expander
/// short-circuits before dispatch).
pub const BUILTIN_NAMES: &[&str] = &["dnl", "expand", "quote", "len", "sub", "gsub", "undefine"];

pub fn is_builtin(name: &str) -> bool {
	BUILTIN_NAMES.contains(&name)
}

/// What a builtin produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinOutput {
	Piece(Piece),
	/// `%{expand:...}`: the text goes through the expander once more.
	Reexpand(String),
}

/// Evaluate a builtin over already-expanded arguments.  `raw` is the
/// original snippet, emitted back verbatim when arguments do not parse.
pub fn eval_builtin(name: &str, raw: &str, args: &[String], db: &mut MacroRegistry) -> BuiltinOutput {
	let lit = |s: String| BuiltinOutput::Piece(Piece::Lit(s));
	match name {
		"dnl" => lit(String::new()),
		"expand" => BuiltinOutput::Reexpand(args.first().cloned().unwrap_or_default()),
		"quote" => BuiltinOutput::Piece(Piece::Opaque(args.first().cloned().unwrap_or_default())),
		"len" => lit(args.first().map_or(0, |a| a.chars().count()).to_string().into()),
		"sub" => {
			let (Some(string), Some(start), Some(stop)) = (args.first(), args.get(1), args.get(2)) else {
				return lit(raw.into());
			};
			let (Ok(start), Ok(stop)) = (start.parse::<i64>(), stop.parse::<i64>()) else {
				return lit(raw.into());
			};
			lit(substring(string, start, stop))
		}
		"gsub" => {
			let (Some(string), Some(pattern), Some(repl)) = (args.first(), args.get(1), args.get(2)) else {
				return lit(raw.into());
			};
			let limit = match args.get(3) {
				Some(n) => match n.parse::<usize>() {
					Ok(n) => Some(n),
					Err(_) => return lit(raw.into()),
				},
				None => None,
			};
			lit(gsub(string, pattern, repl, limit))
		}
		"undefine" => {
			if let Some(name) = args.first() {
				db.undefine(name);
			}
			lit(String::new())
		}
		_ => lit(raw.into()),
	}
}

/// 1-based inclusive slice; negative indices count from the end
/// (`-1` is the last character).
fn substring(s: &str, start: i64, stop: i64) -> String {
	let chars: Vec<char> = s.chars().collect();
	let len = chars.len() as i64;
	let resolve = |idx: i64| -> i64 {
		if idx < 0 {
			len + idx
		} else {
			idx - 1
		}
	};
	let from = resolve(start).max(0);
	let to = resolve(stop).min(len - 1);
	if from > to {
		return String::new();
	}
	chars[from as usize..=to as usize].iter().copied().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pat {
	Word,
	Digit,
	Alpha,
	Space,
	Any,
	Literal(char),
}

#[derive(Debug, Clone, Copy)]
struct Elem {
	pat: Pat,
	plus: bool,
}

/// Compile the supported Lua-pattern subset: `%w %d %a %s`, `%X` as a
/// literal `X`, `.` as any char, `+` as one-or-more on the previous
/// element, everything else literal.
fn compile(pattern: &str) -> Vec<Elem> {
	let mut elems: Vec<Elem> = vec![];
	let mut chars = pattern.chars();
	while let Some(c) = chars.next() {
		let pat = match c {
			'%' => match chars.next() {
				Some('w') => Pat::Word,
				Some('d') => Pat::Digit,
				Some('a') => Pat::Alpha,
				Some('s') => Pat::Space,
				Some(escaped) => Pat::Literal(escaped),
				None => Pat::Literal('%'),
			},
			'.' => Pat::Any,
			'+' => {
				if let Some(last) = elems.last_mut() {
					last.plus = true;
					continue;
				}
				Pat::Literal('+')
			}
			_ => Pat::Literal(c),
		};
		elems.push(Elem { pat, plus: false });
	}
	elems
}

fn matches(pat: Pat, c: char) -> bool {
	match pat {
		Pat::Word => c.is_alphanumeric(),
		Pat::Digit => c.is_ascii_digit(),
		Pat::Alpha => c.is_alphabetic(),
		Pat::Space => c.is_whitespace(),
		Pat::Any => true,
		Pat::Literal(l) => c == l,
	}
}

/// Greedy match with backtracking; returns the end position.
fn match_elems(chars: &[char], pos: usize, elems: &[Elem]) -> Option<usize> {
	let Some((e, rest)) = elems.split_first() else {
		return Some(pos);
	};
	if e.plus {
		let mut count = 0;
		while pos + count < chars.len() && matches(e.pat, chars[pos + count]) {
			count += 1;
		}
		while count >= 1 {
			if let Some(end) = match_elems(chars, pos + count, rest) {
				return Some(end);
			}
			count -= 1;
		}
		return None;
	}
	if pos < chars.len() && matches(e.pat, chars[pos]) {
		return match_elems(chars, pos + 1, rest);
	}
	None
}

/// Replace up to `limit` non-overlapping matches of `pattern` in `s`.
fn gsub(s: &str, pattern: &str, repl: &str, limit: Option<usize>) -> String {
	let elems = compile(pattern);
	if elems.is_empty() {
		return s.into();
	}
	let chars: Vec<char> = s.chars().collect();
	let mut out = String::new();
	let mut pos = 0;
	let mut done = 0usize;
	while pos < chars.len() {
		if limit.map_or(true, |n| done < n) {
			if let Some(end) = match_elems(&chars, pos, &elems) {
				if end > pos {
					out.push_str(repl);
					done += 1;
					pos = end;
					continue;
				}
			}
		}
		out.push(chars[pos]);
		pos += 1;
	}
	out
}
