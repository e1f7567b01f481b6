//! Macro definitions, the definition registry, and the `%{...}` call
//! scanner.
//!
//! A macro name maps to a *stack* of definitions: redefinition pushes,
//! `%undefine` pops one, and ephemeral argument bindings for parametric
//! calls are just extra frames pushed with `special = true`.

use crate::error::ExpandError;
use serde::Serialize;
use smartstring::alias::String;
use std::collections::{BTreeMap, HashMap};

/// A single macro definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroDefinition {
	pub body: String,
	/// `None` = plain macro.  `Some("")` = parametric without declared
	/// options.  `Some("p:isv")` = getopt-style parameter spec.
	pub params: Option<String>,
}

/// Stack of definitions sharing one name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Macro {
	stack: Vec<MacroDefinition>,
}

impl Macro {
	pub fn value(&self) -> &str {
		self.stack.last().map_or("", |d| &d.body)
	}

	pub fn params(&self) -> Option<&str> {
		self.stack.last().and_then(|d| d.params.as_deref())
	}

	/// Whether the top definition consumes a line tail of arguments.
	pub fn parametric(&self) -> bool {
		self.stack.last().is_some_and(|d| d.params.is_some())
	}
}

/// Return true if `name` is assignable: first char alphabetic or `_`,
/// length at least 3, all chars alphanumeric or `_`.
pub fn is_macro_name(name: &str) -> bool {
	let mut chars = name.chars();
	let Some(first) = chars.next() else { return false };
	if !(first.is_alphabetic() || first == '_') {
		return false;
	}
	if name.chars().count() < 3 {
		return false;
	}
	name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Registry of macro definitions, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
	db: HashMap<String, Macro>,
}

impl MacroRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, name: &str) -> Option<&Macro> {
		self.db.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.db.contains_key(name)
	}

	/// Top body of `name`, or `fallback` when undefined.  Callers use the
	/// fallback to leave the literal `%name` in place.
	pub fn get_macro_value<'a>(&'a self, name: &str, fallback: &'a str) -> &'a str {
		self.db.get(name).map_or(fallback, Macro::value)
	}

	/// Push a definition.  `special = true` skips name validation and is
	/// reserved for ephemeral argument bindings (`1`, `#`, `0`, `-p`, ...).
	pub fn define(&mut self, name: &str, body: &str, params: Option<&str>, special: bool) -> Result<(), ExpandError> {
		if !special && !is_macro_name(name) {
			return Err(ExpandError::Name(name.into()));
		}
		let entry = self.db.entry(name.into()).or_default();
		entry.stack.push(MacroDefinition { body: body.into(), params: params.map(Into::into) });
		Ok(())
	}

	/// Pop one definition of `name`; remove the entry when the stack
	/// empties.  Undefining an absent name is a no-op.
	pub fn undefine(&mut self, name: &str) {
		if let Some(entry) = self.db.get_mut(name) {
			entry.stack.pop();
			if entry.stack.is_empty() {
				self.db.remove(name);
			}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.db.is_empty()
	}

	/// Serializable view of every definition stack, for tests and
	/// diagnostics.
	pub fn snapshot(&self) -> BTreeMap<std::string::String, Vec<MacroDefinition>> {
		self.db.iter().map(|(k, v)| (k.as_str().to_owned(), v.stack.clone())).collect()
	}
}

/// Scanned `%{...}` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroCall {
	pub name: String,
	/// `?` flag seen.
	pub question: bool,
	/// `!` flag seen.
	pub negate: bool,
	/// Space- or colon-separated rest of the call (arguments).
	pub param: Option<String>,
	/// The param came after `:`; it is then a single unsplit argument.
	pub colon: bool,
	/// Colon-separated alternative text; only with the `?` flag.
	pub alt: Option<String>,
}

/// Scan a macro name prefix of `text`.  Besides regular name chars this
/// admits the ephemeral argument spellings (`%1`, `%#`, `%*`, `%-f`,
/// `%-f*`).
pub(crate) fn scan_name(text: &str) -> Option<(usize, &str)> {
	let mut it = text.char_indices();
	let (_, first) = it.next()?;
	if first == '#' || first == '*' {
		return Some((1, &text[..1]));
	}
	if first == '-' {
		let (_, flag) = it.next()?;
		if !flag.is_ascii_alphabetic() {
			return None;
		}
		if let Some((i, '*')) = it.next() {
			return Some((i + 1, &text[..=i]));
		}
		return Some((2, &text[..2]));
	}
	if first.is_ascii_digit() {
		let end = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
		return Some((end, &text[..end]));
	}
	if !(first.is_alphanumeric() || first == '_') {
		return None;
	}
	let end = text.find(|c: char| !(c.is_alphanumeric() || c == '_')).unwrap_or(text.len());
	Some((end, &text[..end]))
}

/// Byte length of the macro construct starting at `text` (which begins
/// with `%`): `%%`, `%{...}`, `%[...]`, `%(...)`, or `%[?!]*name`.
/// Unterminated groups run to the end of the text.
pub(crate) fn find_macro_end(text: &str) -> usize {
	debug_assert!(text.starts_with('%'));
	let rest = &text[1..];
	let mut chars = rest.char_indices();
	let Some((_, first)) = chars.next() else { return 1 };
	if first == '%' {
		return 2;
	}
	if let Some(close) = match first {
		'{' => Some('}'),
		'[' => Some(']'),
		'(' => Some(')'),
		_ => None,
	} {
		let mut depth = 1usize;
		for (i, c) in chars {
			if c == first {
				depth += 1;
			} else if c == close {
				depth -= 1;
				if depth == 0 {
					return 1 + i + c.len_utf8();
				}
			}
		}
		return text.len();
	}
	let flags = rest.chars().take_while(|c| *c == '?' || *c == '!').count();
	let after = &rest[flags..];
	let name_len = scan_name(after).map_or(0, |(end, _)| end);
	if name_len == 0 && flags == 0 {
		return 1;
	}
	1 + flags + name_len
}

/// Parse a `%{...}` snippet into a [`MacroCall`].  Returns `None` for
/// shapes the engine leaves verbatim (leading whitespace, empty name,
/// stray characters after the name).
pub fn parse_macro_call(snippet: &str) -> Option<MacroCall> {
	let inner = snippet.strip_prefix("%{")?.strip_suffix('}')?;
	let mut call = MacroCall::default();
	let mut rest = inner;
	loop {
		match rest.chars().next() {
			Some('?') => {
				call.question = true;
				rest = &rest[1..];
			}
			Some('!') => {
				call.negate = true;
				rest = &rest[1..];
			}
			_ => break,
		}
	}
	let (end, name) = scan_name(rest)?;
	call.name = name.into();
	rest = &rest[end..];
	match rest.chars().next() {
		None => Some(call),
		Some(':') => {
			let rest = &rest[1..];
			if call.question {
				call.alt = Some(rest.into());
			} else {
				call.colon = true;
				call.param = Some(rest.into());
			}
			Some(call)
		}
		Some(c) if c == ' ' || c == '\t' => {
			call.param = Some(rest[1..].into());
			Some(call)
		}
		Some('\n') => {
			call.param = Some(rest[1..].into());
			Some(call)
		}
		Some(_) => None,
	}
}
