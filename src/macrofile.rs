//! Macro definition file parsing (`%name[(params)] body` lines), also
//! reused for `%define`/`%global` bodies inside spec files.

use crate::error::ExpandError;
use crate::macros::MacroRegistry;
use crate::tokenize::{tokenize, EscapeMode, Token};
use smartstring::alias::String;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Start,
	MacroStart,
	MacroName,
	Params,
	ValueStart,
	Value,
	IgnoreTilEol,
}

/// One parsed definition: `(name, body, params)`.
pub type Definition = (String, String, Option<String>);

/// Split `text` into macro definitions.
///
/// `inspec = false` parses a macro file: a plain newline at bracket
/// depth 0 terminates each definition and escaped newlines are pure
/// continuations.  `inspec = true` parses a single `%define`/`%global`
/// body already bounded by the spec splitter: plain newlines belong to
/// the body and an escaped newline contributes a literal `\n`.
pub fn macrofile_definitions(text: &str, inspec: bool) -> Vec<Definition> {
	let mut out = vec![];
	let mut state = State::Start;
	let mut name = String::new();
	let mut params: Option<String> = None;
	let mut value = String::new();
	let mut depth = 0usize;
	let mut bracket = ('{', '}');

	macro_rules! reset {
		() => {
			state = State::Start;
			name.clear();
			params = None;
			value.clear();
			depth = 0;
		};
	}

	for tok in tokenize(text, EscapeMode::MacroBody) {
		match state {
			State::Start => {
				if tok.is_space() {
					continue;
				}
				state = if tok.is('%') { State::MacroStart } else { State::IgnoreTilEol };
			}
			State::MacroStart => {
				if tok.is('\n') {
					state = State::Start;
				} else if tok.is_space() {
					// whitespace between `%` and the name is fine
				} else {
					name.push(tok.ch());
					state = State::MacroName;
				}
			}
			State::MacroName => {
				if tok.is_special('\n') {
					// continuation straight after the name: nothing to
					// define, the next `%` starts over
					reset!();
				} else if tok.is('\n') {
					if inspec {
						value.push('\n');
						state = State::Value;
					} else {
						debug!("macro name: {name}");
						out.push((std::mem::take(&mut name), String::new(), params.take()));
						reset!();
					}
				} else if tok.is('(') {
					state = State::Params;
				} else if tok.is_space() {
					debug!("macro name: {name}");
					state = State::ValueStart;
				} else {
					name.push(tok.ch());
				}
			}
			State::Params => {
				if tok.is(')') {
					state = State::ValueStart;
					params.get_or_insert_with(String::new);
				} else {
					params.get_or_insert_with(String::new).push(tok.ch());
				}
			}
			State::ValueStart => {
				if tok.is_special('\n') {
					if inspec {
						value.push('\n');
						state = State::Value;
					}
				} else if tok.is('\n') {
					if inspec {
						value.push('\n');
						state = State::Value;
					} else {
						out.push((std::mem::take(&mut name), std::mem::take(&mut value), params.take()));
						reset!();
					}
				} else if tok.is_space() {
					// skip
				} else {
					value.push(tok.ch());
					state = State::Value;
				}
			}
			State::Value => {
				if tok.is_special('\n') {
					if inspec {
						value.push('\n');
					}
					continue;
				}
				if depth > 0 {
					if tok.is(bracket.0) {
						depth += 1;
					} else if tok.is(bracket.1) {
						depth -= 1;
					}
					value.push(tok.ch());
					continue;
				}
				if let Token::Char(c @ ('{' | '[' | '(')) = tok {
					bracket = match c {
						'{' => ('{', '}'),
						'[' => ('[', ']'),
						_ => ('(', ')'),
					};
					depth = 1;
					value.push(c);
					continue;
				}
				if tok.is('\n') && !inspec {
					out.push((std::mem::take(&mut name), std::mem::take(&mut value), params.take()));
					reset!();
					continue;
				}
				value.push(tok.ch());
			}
			State::IgnoreTilEol => {
				if tok.is('\n') {
					state = State::Start;
				}
			}
		}
	}
	match state {
		State::Value | State::ValueStart => {
			out.push((name, value, params));
		}
		State::MacroName => {
			out.push((name, String::new(), params));
		}
		_ => {}
	}
	out
}

/// Ingest a macro file into `registry`.  Name validation applies; the
/// first invalid name aborts with [`ExpandError::Name`].
pub fn parse_macrofile(text: &str, registry: &mut MacroRegistry, inspec: bool) -> Result<(), ExpandError> {
	for (name, body, params) in macrofile_definitions(text, inspec) {
		registry.define(&name, &body, params.as_deref(), false)?;
	}
	Ok(())
}
