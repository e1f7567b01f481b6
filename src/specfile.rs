//! Spec file splitting and macro expansion.
//!
//! The splitter groups tokens into coarse snippets (plain text, one
//! macro reference, a parametric call with its tail, a whole
//! `%define`/`%global` line, a `%{...}`/`%[...]`/`%(...)` group).  The
//! expander rewrites snippets against the registry, keeping its own
//! stack of splitter frames so that macros expanding to macros never
//! recurse through the host call stack.

use crate::builtins::{eval_builtin, is_builtin, BuiltinOutput, Piece};
use crate::error::ExpandError;
use crate::expression::eval_expr;
use crate::getopt::{getopt, split_words};
use crate::macrofile::macrofile_definitions;
use crate::macros::{parse_macro_call, scan_name, MacroCall, MacroRegistry};
use crate::tokenize::{tokenize, EscapeMode, Token};
use color_eyre::Result;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use smartstring::alias::String;
use tracing::debug;

const MAX_EXPANSION_DEPTH: usize = 1000;

/// Keywords that take the rest of the line and swallow the newline.
const EOL_KEYWORDS: &[&str] = &["if", "ifarch", "ifnarch", "else", "endif", "dnl"];
/// Directives that take the rest of the line but keep the newline.
const DIRECTIVES: &[&str] = &["setup", "package"];
/// A trimmed line starting with one of these ends the preamble.
const PREAMBLE_END: &[&str] = &["%prep", "%build", "%install", "%description", "%generate_buildrequires", "%package "];

lazy_static! {
	static ref RE_PREAMBLE_TAG: Regex = Regex::new(r"^(\w+):\s*(.*?)\s*$").unwrap();
	static ref RE_SHELL_CUT: Regex = Regex::new(r"^%\(echo (\S+) \| cut -c(\d+)-(\d+)\)$").unwrap();
}

/// Callbacks a caller may supply to observe the pipeline.
pub trait SpecHooks {
	/// One captured preamble tag line (`Name: value`), lowercased tag
	/// first, the raw spelling last.
	fn tag_found(&mut self, name: &str, value: &str, raw_tag: &str);

	/// Whether the host architecture matches a `%ifarch`/`%ifnarch`
	/// list.  `None` (the default) makes both directives take their
	/// branch.
	fn arch_matches(&mut self, _arches: &str) -> Option<bool> {
		None
	}
}

/// One splitter-emitted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
	pub text: String,
	/// The chunk sits in a `#` comment line; control constructs inside
	/// stay inert.
	pub in_comment: bool,
	/// Only whitespace preceded the leading `%` on its line.
	pub starts_line: bool,
}

impl Snippet {
	fn new(text: String, in_comment: bool, starts_line: bool) -> Self {
		Self { text, in_comment, starts_line }
	}
}

struct Splitter {
	tokens: Vec<Token>,
	pos: usize,
	line_blank: bool,
	in_comment: bool,
}

impl Splitter {
	fn new(text: &str) -> Self {
		Self { tokens: tokenize(text, EscapeMode::SpecText), pos: 0, line_blank: true, in_comment: false }
	}

	fn peek(&self) -> Option<Token> {
		self.tokens.get(self.pos).copied()
	}

	fn peek2(&self) -> Option<Token> {
		self.tokens.get(self.pos + 1).copied()
	}

	fn bump(&mut self) -> Option<Token> {
		let tok = self.peek()?;
		self.pos += 1;
		if tok.is('\n') {
			self.line_blank = true;
			self.in_comment = false;
		} else if tok.is('#') && self.line_blank && !self.in_comment {
			self.in_comment = true;
			self.line_blank = false;
		} else if !tok.is_space() || tok.is_special('\n') {
			self.line_blank = false;
		}
		Some(tok)
	}

	/// Pull the next snippet, consulting `db` for known-parametric
	/// names.
	fn next_snippet(&mut self, db: &MacroRegistry) -> Option<Snippet> {
		let mut buf = String::new();
		while let Some(tok) = self.peek() {
			if tok.is('%') {
				break;
			}
			self.bump();
			buf.push(tok.ch());
		}
		if !buf.is_empty() {
			return Some(Snippet::new(buf, self.in_comment, false));
		}
		self.peek()?;
		let starts_line = self.line_blank;
		let in_comment = self.in_comment;
		self.bump(); // the `%`
		let mut buf = String::from("%");
		let snip = |text: String| Some(Snippet::new(text, in_comment, starts_line));
		let Some(next) = self.peek() else { return snip(buf) };
		if next.is('%') {
			self.bump();
			buf.push('%');
			return snip(buf);
		}
		if next.is('{') {
			self.scan_group(&mut buf, '{', '}');
			return snip(buf);
		}
		if next.is('[') {
			self.scan_group(&mut buf, '[', ']');
			return snip(buf);
		}
		if next.is('(') {
			self.scan_group(&mut buf, '(', ')');
			return snip(buf);
		}
		// conditional `?`/`!` prefixes, then the name
		while let Some(tok) = self.peek() {
			if tok.is('?') || tok.is('!') {
				self.bump();
				buf.push(tok.ch());
			} else {
				break;
			}
		}
		let name = self.scan_name(&mut buf);
		if name.is_empty() {
			return snip(buf);
		}
		if EOL_KEYWORDS.contains(&name.as_str()) {
			self.scan_tail(&mut buf, !in_comment);
			return snip(buf);
		}
		if name.as_str() == "define" || name.as_str() == "global" {
			if in_comment {
				self.scan_tail(&mut buf, false);
			} else {
				self.scan_definition(&mut buf);
			}
			return snip(buf);
		}
		let known_parametric = db.get(&name).is_some_and(crate::macros::Macro::parametric);
		if is_builtin(&name) || DIRECTIVES.contains(&name.as_str()) || known_parametric {
			self.scan_tail(&mut buf, false);
			return snip(buf);
		}
		snip(buf)
	}

	/// Name characters after `%`, including the ephemeral argument
	/// spellings.
	fn scan_name(&mut self, buf: &mut String) -> String {
		let mut name = String::new();
		let Some(first) = self.peek() else { return name };
		let Token::Char(c) = first else { return name };
		if c == '#' || c == '*' {
			self.bump();
			name.push(c);
			buf.push(c);
			return name;
		}
		if c == '-' {
			let Some(Token::Char(flag)) = self.peek2() else { return name };
			if !flag.is_ascii_alphabetic() {
				return name;
			}
			self.bump();
			self.bump();
			name.push('-');
			name.push(flag);
			if let Some(tok) = self.peek() {
				if tok.is('*') {
					self.bump();
					name.push('*');
				}
			}
			buf.push_str(&name);
			return name;
		}
		if c.is_ascii_digit() {
			while let Some(Token::Char(d)) = self.peek() {
				if !d.is_ascii_digit() {
					break;
				}
				self.bump();
				name.push(d);
			}
			buf.push_str(&name);
			return name;
		}
		if !(c.is_alphanumeric() || c == '_') {
			return name;
		}
		while let Some(Token::Char(d)) = self.peek() {
			if !(d.is_alphanumeric() || d == '_') {
				break;
			}
			self.bump();
			name.push(d);
		}
		buf.push_str(&name);
		name
	}

	/// Whole `%{...}`-style group, brackets included.  Runs to EOF when
	/// unterminated.
	fn scan_group(&mut self, buf: &mut String, open: char, close: char) {
		let mut depth = 0i32;
		while let Some(tok) = self.bump() {
			if tok.is(open) {
				depth += 1;
			} else if tok.is(close) {
				depth -= 1;
			}
			buf.push(tok.ch());
			if depth == 0 {
				break;
			}
		}
	}

	/// Rest of the line.  An escaped newline always terminates and is
	/// consumed; a real newline is consumed only when `eat_newline`.
	fn scan_tail(&mut self, buf: &mut String, eat_newline: bool) {
		while let Some(tok) = self.peek() {
			if tok.is('\n') {
				if eat_newline {
					self.bump();
				}
				return;
			}
			if tok.is_special('\n') {
				self.bump();
				return;
			}
			self.bump();
			buf.push(tok.ch());
		}
	}

	/// `%define`/`%global` body: runs to an unbracketed newline (which
	/// is consumed), escaped newlines and escapes are re-emitted in
	/// backslash form so the macro-file parser sees them again.
	fn scan_definition(&mut self, buf: &mut String) {
		let mut depth = 0usize;
		let mut pair = ('{', '}');
		while let Some(tok) = self.peek() {
			if let Token::Special(c) = tok {
				self.bump();
				buf.push('\\');
				buf.push(c);
				continue;
			}
			if depth > 0 {
				if tok.is(pair.0) {
					depth += 1;
				} else if tok.is(pair.1) {
					depth -= 1;
				}
				self.bump();
				buf.push(tok.ch());
				continue;
			}
			if let Token::Char(c @ ('{' | '[' | '(')) = tok {
				pair = match c {
					'{' => ('{', '}'),
					'[' => ('[', ']'),
					_ => ('(', ')'),
				};
				depth = 1;
				self.bump();
				buf.push(c);
				continue;
			}
			if tok.is('\n') {
				self.bump();
				return;
			}
			self.bump();
			buf.push(tok.ch());
		}
	}
}

/// Conditional and guard state carried through one expansion.
#[derive(Debug, Default)]
struct SpecContext {
	/// `(taken, flipped)` per open `%if`.
	cond: Vec<(bool, bool)>,
	/// Set while a `%if` expression is being expanded.
	in_expr: bool,
}

impl SpecContext {
	fn expanding(&self) -> bool {
		self.cond.iter().all(|(taken, flipped)| taken ^ flipped)
	}
}

/// Line sink capturing `Tag: value` pairs until the first section
/// keyword.
#[derive(Debug, Default)]
struct TagCapture {
	buf: std::string::String,
	done: bool,
}

impl TagCapture {
	fn feed(&mut self, text: &str, db: &mut MacroRegistry, hooks: &mut Option<&mut dyn SpecHooks>) {
		if self.done {
			return;
		}
		self.buf.push_str(text);
		while let Some(pos) = self.buf.find('\n') {
			let line: std::string::String = self.buf[..pos].into();
			self.buf.drain(..=pos);
			self.line(&line, db, hooks);
		}
	}

	fn finish(&mut self, db: &mut MacroRegistry, hooks: &mut Option<&mut dyn SpecHooks>) {
		if !self.buf.is_empty() {
			let line = std::mem::take(&mut self.buf);
			self.line(&line, db, hooks);
		}
	}

	fn line(&mut self, line: &str, db: &mut MacroRegistry, hooks: &mut Option<&mut dyn SpecHooks>) {
		if self.done {
			return;
		}
		let trimmed = line.trim();
		if PREAMBLE_END.iter().any(|kw| trimmed.starts_with(kw)) {
			self.done = true;
			return;
		}
		let Some(caps) = RE_PREAMBLE_TAG.captures(trimmed) else { return };
		let raw_tag = &caps[1];
		let lower = raw_tag.to_lowercase();
		if !matches!(lower.as_str(), "name" | "version" | "release" | "epoch") {
			return;
		}
		let value = &caps[2];
		// capture is best effort, a strange value is not an error
		db.define(&lower, value, None, false).ok();
		db.define(&lower.to_uppercase(), value, None, false).ok();
		if let Some(h) = hooks.as_deref_mut() {
			h.tag_found(&lower, value, raw_tag);
		}
	}
}

struct Frame {
	splitter: Splitter,
	/// Ephemeral bindings undone (in reverse) when this frame exhausts.
	cleanup: Vec<String>,
}

impl Frame {
	fn new(text: &str) -> Self {
		Self { splitter: Splitter::new(text), cleanup: vec![] }
	}
}

enum Action {
	None,
	Push { text: String, cleanup: Vec<String> },
}

impl Action {
	fn push_text(text: impl Into<String>) -> Self {
		Self::Push { text: text.into(), cleanup: vec![] }
	}
}

struct Expander<'a> {
	db: &'a mut MacroRegistry,
	ctx: SpecContext,
	hooks: Option<&'a mut dyn SpecHooks>,
	tags: Option<TagCapture>,
}

impl<'a> Expander<'a> {
	fn new(db: &'a mut MacroRegistry, hooks: Option<&'a mut dyn SpecHooks>, capture: bool) -> Self {
		Self { db, ctx: SpecContext::default(), hooks, tags: capture.then(TagCapture::default) }
	}

	/// The work-stack loop.  `base` is the depth already consumed by
	/// enclosing expansions; `capture` routes top-level output through
	/// the preamble tag sink.
	fn drive(&mut self, text: &str, base: usize, capture: bool, out: &mut Vec<Piece>) -> Result<()> {
		let mut stack = vec![Frame::new(text)];
		let mut fed = out.len();
		let mut failure: Option<color_eyre::Report> = None;
		if base + stack.len() > MAX_EXPANSION_DEPTH {
			return Err(ExpandError::Recursion.into());
		}
		while let Some(frame) = stack.last_mut() {
			let Some(snippet) = frame.splitter.next_snippet(self.db) else {
				for name in std::mem::take(&mut frame.cleanup).iter().rev() {
					self.db.undefine(name);
				}
				stack.pop();
				continue;
			};
			let depth = base + stack.len();
			match self.process(&snippet, depth, out) {
				Ok(Action::None) => {}
				Ok(Action::Push { text, cleanup }) => {
					if base + stack.len() + 1 > MAX_EXPANSION_DEPTH {
						for name in cleanup.iter().rev() {
							self.db.undefine(name);
						}
						failure = Some(ExpandError::Recursion.into());
						break;
					}
					stack.push(Frame { splitter: Splitter::new(&text), cleanup });
				}
				Err(e) => {
					failure = Some(e);
					break;
				}
			}
			if capture && self.tags.is_some() {
				if let Some(mut tags) = self.tags.take() {
					for piece in &out[fed..] {
						tags.feed(piece.text(), self.db, &mut self.hooks);
					}
					self.tags = Some(tags);
				}
				fed = out.len();
			}
		}
		if let Some(e) = failure {
			// release every binding still on the stack
			for frame in stack.iter_mut().rev() {
				for name in std::mem::take(&mut frame.cleanup).iter().rev() {
					self.db.undefine(name);
				}
			}
			return Err(e);
		}
		Ok(())
	}

	fn expand_pieces(&mut self, text: &str, base: usize) -> Result<Vec<Piece>> {
		let mut out = vec![];
		self.drive(text, base, false, &mut out)?;
		Ok(out)
	}

	fn expand_str(&mut self, text: &str, base: usize) -> Result<std::string::String> {
		Ok(self.expand_pieces(text, base)?.iter().map(Piece::text).collect())
	}

	fn emit(&self, out: &mut Vec<Piece>, text: &str) {
		if self.ctx.expanding() {
			out.push(Piece::Lit(text.into()));
		}
	}

	fn process(&mut self, sn: &Snippet, depth: usize, out: &mut Vec<Piece>) -> Result<Action> {
		let text = sn.text.as_str();
		debug!("snippet: {text:?}");
		if !text.starts_with('%') {
			self.emit(out, text);
			return Ok(Action::None);
		}
		if text == "%" || text == "%%" {
			self.emit(out, "%");
			return Ok(Action::None);
		}
		if text.starts_with("%{") || text.starts_with("%[") || text.starts_with("%(") {
			if !self.ctx.expanding() {
				return Ok(Action::None);
			}
			if text.starts_with("%[") {
				return self.process_expr(text, depth, out);
			}
			if text.starts_with("%(") {
				return self.process_shell(text, out);
			}
			let Some(call) = parse_macro_call(text) else {
				self.emit(out, text);
				return Ok(Action::None);
			};
			return self.process_call(text, &call, depth, out);
		}
		// line form: %[?!]*name [tail]
		let rest = &text[1..];
		let flag_len = rest.chars().take_while(|c| *c == '?' || *c == '!').count();
		let question = rest[..flag_len].contains('?');
		let negate = rest[..flag_len].contains('!');
		let after = &rest[flag_len..];
		let Some((name_len, name)) = scan_name(after) else {
			self.emit(out, text);
			return Ok(Action::None);
		};
		let tail = &after[name_len..];
		match name {
			"if" | "ifarch" | "ifnarch" => return self.process_if(sn, name, tail, depth, out),
			"else" => return self.process_else(sn, out),
			"endif" => return self.process_endif(sn, out),
			"dnl" => {
				if sn.in_comment {
					self.emit(out, text);
				}
				return Ok(Action::None);
			}
			"define" | "global" => return self.process_definition(sn, name, tail, depth, out),
			_ => {}
		}
		if !self.ctx.expanding() {
			return Ok(Action::None);
		}
		let call = MacroCall {
			name: name.into(),
			question,
			negate,
			param: (!tail.is_empty()).then(|| tail.into()),
			colon: false,
			alt: None,
		};
		self.process_call(text, &call, depth, out)
	}

	fn process_if(&mut self, sn: &Snippet, keyword: &str, tail: &str, depth: usize, out: &mut Vec<Piece>) -> Result<Action> {
		if sn.in_comment || !sn.starts_line {
			self.emit(out, sn.text.as_str());
			return Ok(Action::None);
		}
		if self.ctx.in_expr {
			return Err(ExpandError::Parse("%if inside a %if expression".into()).into());
		}
		if !self.ctx.expanding() {
			// track nesting, never evaluate inside a dead branch
			self.ctx.cond.push((false, false));
			return Ok(Action::None);
		}
		if keyword != "if" {
			// architecture checks live outside the core; without a
			// collaborator both directives default to true
			let taken = match self.hooks.as_deref_mut().and_then(|h| h.arch_matches(tail.trim())) {
				Some(matched) => matched == (keyword == "ifarch"),
				None => true,
			};
			self.ctx.cond.push((taken, false));
			return Ok(Action::None);
		}
		if tail.trim().is_empty() {
			return Err(ExpandError::Parse("%if without expression".into()).into());
		}
		self.ctx.in_expr = true;
		let expanded = self.expand_str(tail, depth);
		self.ctx.in_expr = false;
		let expanded = expanded?;
		if expanded.contains('%') {
			// unresolved macros make the condition false, %else may
			// still flip it
			self.ctx.cond.push((false, false));
			return Ok(Action::None);
		}
		let value = eval_expr(expanded.trim())?;
		self.ctx.cond.push((value.truthy(), false));
		Ok(Action::None)
	}

	fn process_else(&mut self, sn: &Snippet, out: &mut Vec<Piece>) -> Result<Action> {
		if sn.in_comment || !sn.starts_line {
			self.emit(out, sn.text.as_str());
			return Ok(Action::None);
		}
		let Some(top) = self.ctx.cond.last_mut() else {
			return Err(ExpandError::Parse("%else without %if".into()).into());
		};
		if top.1 {
			return Err(ExpandError::Parse("double %else".into()).into());
		}
		top.1 = true;
		Ok(Action::None)
	}

	fn process_endif(&mut self, sn: &Snippet, out: &mut Vec<Piece>) -> Result<Action> {
		if sn.in_comment || !sn.starts_line {
			self.emit(out, sn.text.as_str());
			return Ok(Action::None);
		}
		// a stray %endif is silently ignored
		self.ctx.cond.pop();
		Ok(Action::None)
	}

	fn process_definition(&mut self, sn: &Snippet, keyword: &str, tail: &str, depth: usize, out: &mut Vec<Piece>) -> Result<Action> {
		if sn.in_comment {
			self.emit(out, sn.text.as_str());
			return Ok(Action::None);
		}
		if !self.ctx.expanding() {
			return Ok(Action::None);
		}
		let src = format!("%{tail}");
		for (name, body, params) in macrofile_definitions(&src, true) {
			let body: String = if keyword == "global" { self.expand_str(&body, depth)?.into() } else { body };
			self.db.define(&name, &body, params.as_deref(), false)?;
		}
		Ok(Action::None)
	}

	fn process_expr(&mut self, text: &str, depth: usize, out: &mut Vec<Piece>) -> Result<Action> {
		let Some(interior) = text.strip_prefix("%[").and_then(|t| t.strip_suffix(']')) else {
			out.push(Piece::Lit(text.into()));
			return Ok(Action::None);
		};
		let result = crate::expression::eval_expr_with(interior, |s| self.expand_str(s, depth));
		match result {
			Ok(value) => out.push(Piece::Lit(value.to_string().into())),
			Err(e) => {
				// malformed expressions demote to literal passthrough
				if !matches!(e.downcast_ref::<ExpandError>(), Some(ExpandError::Syntax(_))) {
					return Err(e);
				}
				debug!("%[...] not an expression: {e:#}");
				out.push(Piece::Lit(text.into()));
			}
		}
		Ok(Action::None)
	}

	fn process_shell(&self, text: &str, out: &mut Vec<Piece>) -> Result<Action> {
		if let Some(caps) = RE_SHELL_CUT.captures(text) {
			return Ok(Action::push_text(format!("%{{sub {} {} {}}}", &caps[1], &caps[2], &caps[3])));
		}
		// shell expansion happens outside the core, pass it through
		out.push(Piece::Lit(text.into()));
		Ok(Action::None)
	}

	fn process_call(&mut self, raw: &str, call: &MacroCall, depth: usize, out: &mut Vec<Piece>) -> Result<Action> {
		let name = call.name.as_str();
		if call.question {
			if is_bcond_name(name) && !self.db.contains(name) {
				// bcond guards resolve outside the core, keep them literal
				out.push(Piece::Lit(raw.into()));
				return Ok(Action::None);
			}
			let defined = self.db.contains(name) != call.negate;
			if let Some(alt) = &call.alt {
				return Ok(if defined { Action::push_text(alt.clone()) } else { Action::None });
			}
			if defined {
				let body: String = self.db.get_macro_value(name, "").into();
				return Ok(Action::push_text(body));
			}
			return Ok(Action::None);
		}
		if is_builtin(name) {
			return self.process_builtin(raw, call, depth, out);
		}
		let Some(found) = self.db.get(name) else {
			if is_ephemeral_name(name) {
				// an unbound %1 / %-f* expands to nothing
				return Ok(Action::None);
			}
			out.push(Piece::Lit(raw.into()));
			return Ok(Action::None);
		};
		let parametric = found.parametric();
		let body: String = found.value().into();
		if !parametric {
			return Ok(Action::push_text(body));
		}
		let spec: String = found.params().unwrap_or("").into();
		let (options, positional) = if call.colon {
			let arg: String = self.expand_str(call.param.as_deref().unwrap_or(""), depth)?.into();
			(vec![], vec![arg])
		} else {
			let pieces = self.expand_pieces(call.param.as_deref().unwrap_or(""), depth)?;
			let words = split_words(&pieces);
			match getopt(&words, &spec) {
				Ok(args) => (args.options, args.positional),
				Err(ExpandError::UnknownOption(_)) => {
					out.push(Piece::Lit(raw.into()));
					return Ok(Action::None);
				}
				Err(e) => return Err(e.into()),
			}
		};
		fn bind(db: &mut MacroRegistry, cleanup: &mut Vec<String>, bname: String, bbody: &str) -> Result<()> {
			db.define(&bname, bbody, None, true)?;
			cleanup.push(bname);
			Ok(())
		}
		let mut cleanup: Vec<String> = vec![];
		bind(self.db, &mut cleanup, "0".into(), name)?;
		for (i, arg) in positional.iter().enumerate() {
			bind(self.db, &mut cleanup, (i + 1).to_string().into(), arg)?;
		}
		bind(self.db, &mut cleanup, "#".into(), &positional.len().to_string())?;
		bind(self.db, &mut cleanup, "*".into(), &positional.iter().join(" "))?;
		for (flag, value) in &options {
			let with_flag = match value {
				Some(v) => format!("-{flag} {v}"),
				None => format!("-{flag}"),
			};
			bind(self.db, &mut cleanup, format!("-{flag}").into(), &with_flag)?;
			bind(self.db, &mut cleanup, format!("-{flag}*").into(), value.as_deref().unwrap_or(""))?;
		}
		Ok(Action::Push { text: body, cleanup })
	}

	fn process_builtin(&mut self, raw: &str, call: &MacroCall, depth: usize, out: &mut Vec<Piece>) -> Result<Action> {
		let name = call.name.as_str();
		if name == "dnl" {
			return Ok(Action::None);
		}
		let args: Vec<String> = match &call.param {
			Some(param) if call.colon => vec![self.expand_str(param, depth)?.into()],
			Some(param) => {
				let pieces = self.expand_pieces(param, depth)?;
				split_words(&pieces)
			}
			None => vec![],
		};
		match eval_builtin(name, raw, &args, self.db) {
			BuiltinOutput::Piece(piece) => {
				out.push(piece);
				Ok(Action::None)
			}
			BuiltinOutput::Reexpand(text) => Ok(Action::push_text(text)),
		}
	}
}

fn is_ephemeral_name(name: &str) -> bool {
	name.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '#' || c == '*' || c == '-')
}

fn is_bcond_name(name: &str) -> bool {
	name.starts_with("with_") || name.starts_with("without_")
}

fn collect(pieces: &[Piece]) -> std::string::String {
	pieces.iter().map(Piece::text).collect()
}

/// Expand a whole spec file, capturing `Name:`/`Version:`/`Release:`/
/// `Epoch:` preamble tags into the registry as it goes.
pub fn expand_specfile<'a>(text: &str, db: &'a mut MacroRegistry, hooks: Option<&'a mut dyn SpecHooks>) -> Result<std::string::String> {
	let mut ex = Expander::new(db, hooks, true);
	let mut out = vec![];
	ex.drive(text, 0, true, &mut out)?;
	if let Some(mut tags) = ex.tags.take() {
		tags.finish(ex.db, &mut ex.hooks);
	}
	Ok(collect(&out))
}

/// Expand a string against the registry, no preamble tag capture.
pub fn expand_specfile_string(text: &str, db: &mut MacroRegistry) -> Result<std::string::String> {
	let mut ex = Expander::new(db, None, false);
	let mut out = vec![];
	ex.drive(text, 0, false, &mut out)?;
	Ok(collect(&out))
}

/// Tokenizer + splitter only: the snippet stream a spec file divides
/// into.
pub fn split_specfile(text: &str, db: &MacroRegistry) -> Vec<Snippet> {
	let mut splitter = Splitter::new(text);
	let mut out = vec![];
	while let Some(snippet) = splitter.next_snippet(db) {
		out.push(snippet);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use color_eyre::Result;

	fn registry(pairs: &[(&str, &str)]) -> MacroRegistry {
		let mut db = MacroRegistry::new();
		for (name, body) in pairs {
			db.define(name, body, None, false).unwrap();
		}
		db
	}

	fn expand(text: &str, db: &mut MacroRegistry) -> std::string::String {
		expand_specfile(text, db, None).unwrap()
	}

	fn split(text: &str, db: &MacroRegistry) -> Vec<std::string::String> {
		split_specfile(text, db).into_iter().map(|s| s.text.as_str().to_owned()).collect()
	}

	#[test]
	fn split_basic_spec() {
		let db = MacroRegistry::new();
		assert!(split("", &db).is_empty());
		assert_eq!(split("%foo", &db), ["%foo"]);
		assert_eq!(split("%foo%foo", &db), ["%foo", "%foo"]);
		assert_eq!(split("%{foo}%foo", &db), ["%{foo}", "%foo"]);
		assert_eq!(split("%{foo}foo", &db), ["%{foo}", "foo"]);
		assert_eq!(split("%foo %{bar} %{doh}", &db), ["%foo", " ", "%{bar}", " ", "%{doh}"]);
		assert_eq!(split("% %%", &db), ["%", " ", "%%"]);
		assert_eq!(split("a %{?bar:%{configure}}", &db), ["a ", "%{?bar:%{configure}}"]);
		assert_eq!(split(" foo%bar@bar", &db), [" foo", "%bar", "@bar"]);
		assert_eq!(split("%bar%{bar}%bar", &db), ["%bar", "%{bar}", "%bar"]);
		assert_eq!(split("%@bar", &db), ["%", "@bar"]);
		assert_eq!(split("%bar{baz}", &db), ["%bar", "{baz}"]);
		assert_eq!(split("%bar{baz%bar", &db), ["%bar", "{baz", "%bar"]);
	}

	#[test]
	fn split_parametric_line() {
		let mut db = MacroRegistry::new();
		db.define("foo", "a %1 b", Some(""), false).unwrap();
		db.define("bar", "a %1 b", None, false).unwrap();
		assert_eq!(split("%foo a b c", &db), ["%foo a b c"]);
		assert_eq!(split("%foo a b c\nb", &db), ["%foo a b c", "\nb"]);
		assert_eq!(split("%foo a %b c\\\nb", &db), ["%foo a %b c", "b"]);
		assert_eq!(split("%bar a b c", &db), ["%bar", " a b c"]);
	}

	#[test]
	fn split_conditions_take_the_line() {
		let db = MacroRegistry::new();
		assert_eq!(split("%if %foo", &db), ["%if %foo"]);
	}

	#[test]
	fn split_newlines() {
		let db = MacroRegistry::new();
		assert_eq!(split("abc\n%foo \n%{blah: %{foo\n}}%doh", &db), ["abc\n", "%foo", " \n", "%{blah: %{foo\n}}", "%doh"]);
	}

	#[test]
	fn split_definitions() {
		let db = MacroRegistry::new();
		assert_eq!(split("blah%define abc foo\n", &db), ["blah", "%define abc foo"]);
		assert_eq!(split("%define abc foo\\\nbar baz\\\nend\n", &db), ["%define abc foo\\\nbar baz\\\nend"]);
		assert_eq!(split("%define abc %{expand:foo\nbar baz\\\nend\n}\n", &db), ["%define abc %{expand:foo\nbar baz\\\nend\n}"]);
		assert_eq!(split(" %global foo \\\n%bar", &db), [" ", "%global foo \\\n%bar"]);
	}

	#[test]
	fn split_tricky_flags() {
		let db = MacroRegistry::new();
		assert_eq!(split(" %??!!foo ", &db), [" ", "%??!!foo", " "]);
		assert_eq!(split("%??!!foo! ", &db), ["%??!!foo", "! "]);
	}

	#[test]
	fn expand_percent_escapes() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%%", &mut db), "%");
		assert_eq!(expand("% a", &mut db), "% a");
	}

	#[test]
	fn expand_basic_macros() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%foo", &mut db), "%foo");
		assert_eq!(expand("%{foo}", &mut db), "%{foo}");
		db.define("foo", "baz", None, false).unwrap();
		assert_eq!(expand("%foo", &mut db), "baz");
		assert_eq!(expand("%{foo}", &mut db), "baz");
	}

	#[test]
	fn expand_recursive() {
		let mut db = registry(&[("bar", "%content"), ("foo", "%bar")]);
		assert_eq!(expand("a b %foo end", &mut db), "a b %content end");
	}

	#[test]
	fn expand_multiline_body() {
		let mut db = registry(&[("bar", "b\nc\nd"), ("foo", "%bar")]);
		assert_eq!(expand("a %foo e", &mut db), "a b\nc\nd e");
	}

	#[test]
	fn define_stores_literal_body() {
		let mut db = registry(&[("bar", "content")]);
		assert_eq!(expand("%define  foo %bar\n%foo", &mut db), "content");
		assert_eq!(db.get("foo").unwrap().value(), "%bar");
	}

	#[test]
	fn global_expands_body() {
		let mut db = registry(&[("bar", "content")]);
		assert_eq!(expand(" %global foo %bar\n%foo", &mut db), " content");
		assert_eq!(db.get("foo").unwrap().value(), "content");
	}

	#[test]
	fn global_with_continuation() {
		let mut db = registry(&[("bar", "content")]);
		assert_eq!(expand(" %global foo \\\n%bar\n", &mut db), " ");
		assert_eq!(db.get("foo").unwrap().value(), "\ncontent");
	}

	#[test]
	fn expand_underscore_chain() {
		let mut db = registry(&[("_prefix", "/usr"), ("_exec_prefix", "%_prefix"), ("_bindir", "%_exec_prefix/bin")]);
		assert_eq!(expand("%{_bindir}", &mut db), "/usr/bin");
	}

	#[test]
	fn parametric_definition_in_spec() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%global nah(param) \\\na b c\n", &mut db), "");
		assert_eq!(db.get("nah").unwrap().params(), Some("param"));
	}

	#[test]
	fn tag_capture_defines_macros() {
		for statement in ["%define", "%global"] {
			let mut db = MacroRegistry::new();
			let text = format!("%define myname foo\n%define myversion 1.1\nName: %myname\n{statement} redefined %name\nVersion: %myversion");
			assert_eq!(expand(&text, &mut db), "Name: foo\nVersion: 1.1");
			assert_eq!(db.get("name").unwrap().value(), "foo");
			let expected = if statement == "%global" { "foo" } else { "%name" };
			assert_eq!(db.get("redefined").unwrap().value(), expected);
		}
	}

	#[test]
	fn tag_capture_keeps_unresolved_values() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("Name: %myname\n%define myname foo\n", &mut db), "Name: %myname\n");
		assert_eq!(db.get("name").unwrap().value(), "%myname");
		assert_eq!(db.get("myname").unwrap().value(), "foo");
	}

	#[test]
	fn tags_parsed_only_in_preamble() {
		for terminator in ["%package foo", "%prep"] {
			let mut db = MacroRegistry::new();
			let text = format!("%define myname python-foo\nName: %myname\n  {terminator} \n : hello\npreparation\nVersion: 10\n");
			let expected = format!("Name: python-foo\n  {terminator} \n : hello\npreparation\nVersion: 10\n");
			assert_eq!(expand(&text, &mut db), expected);
			assert_eq!(db.get("name").unwrap().value(), "python-foo");
			assert!(!db.contains("version"));
		}
	}

	#[test]
	fn tag_capture_hooks() {
		#[derive(Default)]
		struct Collect(Vec<(std::string::String, std::string::String, std::string::String)>);
		impl SpecHooks for Collect {
			fn tag_found(&mut self, name: &str, value: &str, raw: &str) {
				self.0.push((name.into(), value.into(), raw.into()));
			}
		}
		let mut db = MacroRegistry::new();
		let mut hooks = Collect::default();
		let out = expand_specfile("Name: n\nVersion: 1\n%prep\nVersion: 2\n", &mut db, Some(&mut hooks)).unwrap();
		assert_eq!(out, "Name: n\nVersion: 1\n%prep\nVersion: 2\n");
		assert_eq!(hooks.0, vec![("name".into(), "n".into(), "Name".into()), ("version".into(), "1".into(), "Version".into())]);
		assert_eq!(db.get("name").unwrap().value(), "n");
		assert_eq!(db.get("NAME").unwrap().value(), "n");
		assert_eq!(db.get("version").unwrap().value(), "1");
	}

	#[test]
	fn ifarch_defaults_to_true() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%ifarch x86_64\nA\n%endif\n%ifnarch ppc\nB\n%endif\n", &mut db), "A\nB\n");
	}

	#[test]
	fn ifarch_consults_collaborator() {
		struct Arch(&'static str);
		impl SpecHooks for Arch {
			fn tag_found(&mut self, _: &str, _: &str, _: &str) {}
			fn arch_matches(&mut self, arches: &str) -> Option<bool> {
				Some(arches.split_whitespace().any(|a| a == self.0))
			}
		}
		let mut db = MacroRegistry::new();
		let mut arch = Arch("x86_64");
		let out = expand_specfile("%ifarch x86_64 aarch64\nA\n%endif\n%ifnarch x86_64\nB\n%else\nC\n%endif\n", &mut db, Some(&mut arch)).unwrap();
		assert_eq!(out, "A\nC\n");
	}

	#[test]
	fn conditional_lookups() {
		let mut db = registry(&[("foo", "10")]);
		assert_eq!(expand("%{?foo}", &mut db), "10");
		assert_eq!(expand("%{!?foo}", &mut db), "");
		assert_eq!(expand("%{?foo:a}", &mut db), "a");
		assert_eq!(expand("%{!?foo:a}", &mut db), "");
		assert_eq!(expand("%{?bar}", &mut db), "");
		assert_eq!(expand("%{?!bar}", &mut db), "");
		assert_eq!(expand("%{?!bar:a}", &mut db), "a");
	}

	#[test]
	fn undefined_bcond_lookups_stay_verbatim() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%{?with_foo}", &mut db), "%{?with_foo}");
		assert_eq!(expand("%{!?with_foo}", &mut db), "%{!?with_foo}");
		assert_eq!(expand("%{?without_bar:x}", &mut db), "%{?without_bar:x}");
		// other undefined names still vanish under ?
		assert_eq!(expand("%{?plain_name}", &mut db), "");
		db.define("with_foo", "1", None, false).unwrap();
		assert_eq!(expand("%{?with_foo}", &mut db), "1");
	}

	#[test]
	fn append_via_global() {
		let mut db = registry(&[("foo", "content")]);
		assert_eq!(expand("%global foo %foo blah\n%foo\n", &mut db), "content blah\n");
	}

	#[test]
	fn recursion_limit() {
		let mut db = registry(&[("foo", "%bar"), ("bar", "%foo")]);
		let err = expand_specfile_string("%foo", &mut db).unwrap_err();
		assert!(matches!(err.downcast_ref::<ExpandError>(), Some(ExpandError::Recursion)));
	}

	#[test]
	fn multiline_defines() {
		let mut db = MacroRegistry::new();
		let out = expand("%define blah() \\\nnewline\n%define fooo \\ nextline \\  lastline\n%fooo\n", &mut db);
		assert_eq!(out, "nextline   lastline\n");
		assert_eq!(db.get("blah").unwrap().value(), "\nnewline");
		assert_eq!(db.get("fooo").unwrap().value(), "nextline   lastline");
	}

	#[test]
	fn if_else_endif() -> Result<()> {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%if 1\nA\n%else\nB\n%endif\n", &mut db), "A\n");
		assert_eq!(expand("%if 0\nA\n%else\nB\n%endif\n", &mut db), "B\n");
		assert_eq!(expand("%if 1\nif\n%else\nelse\n%endif\n", &mut db), "if\n");
		Ok(())
	}

	#[test]
	fn if_with_unresolved_macro_is_false() {
		let mut db = MacroRegistry::new();
		let out = expand("%global nil %{!?nil:}\n%global foo %nil 0\n%if%foo\nif\n%else\nelse\n%endif\n%global foo 1\n%if %foo\nif\n%else\nelse\n%endif\n", &mut db);
		assert_eq!(out, "else\nif\n");
	}

	#[test]
	fn nil_macro_expands_empty() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%global nil %{!?nil:}\n%global foo %nil 1\n%nil\n", &mut db), "\n");
	}

	#[test]
	fn nested_if_in_expression_errors() {
		let mut db = MacroRegistry::new();
		let err = expand_specfile("%if %if 0\nwhat happens\n%endif\n", &mut db, None).unwrap_err();
		assert!(matches!(err.downcast_ref::<ExpandError>(), Some(ExpandError::Parse(_))));
	}

	#[test]
	fn double_else_errors() {
		let mut db = MacroRegistry::new();
		let err = expand_specfile("%if 1\n%else\n%else\n%endif\n", &mut db, None).unwrap_err();
		assert!(matches!(err.downcast_ref::<ExpandError>(), Some(ExpandError::Parse(_))));
	}

	#[test]
	fn commented_else_is_inert() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("#%else\n", &mut db), "#%else\n");
		assert_eq!(expand("# %else\n", &mut db), "# %else\n");
	}

	#[test]
	fn stray_endif_ignored() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%endif\n", &mut db), "");
	}

	#[test]
	fn else_with_trailing_comment() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%if 0\n%else  # foo\n1\n%endif  # bar\npost\n", &mut db), "1\npost\n");
	}

	#[test]
	fn if_expressions() {
		let mut db = MacroRegistry::new();
		let out = expand(
			"%if 1 - 1\n1\n%endif\n%if 1+1\n2\n%endif\n%if 3*3/3-3 > -1\n3\n%endif\n%if 1 && 0 || 1\n4\n%endif\n%if 1 && 0 || 1 && 0\n5\n%endif\n%if 1 && (0 || 1) && 1\n6\n%endif\n%if 1 && !(0 || !1) && 1\n7\n%endif\n",
			&mut db,
		);
		assert_eq!(out, "2\n3\n4\n6\n7\n");
	}

	#[test]
	fn if_with_macro_operands() {
		let mut db = MacroRegistry::new();
		let out = expand("%global foo 1\n%if 1 - %foo\n1\n%endif\n%if 1 + %foo\n2\n%endif\n", &mut db);
		assert_eq!(out, "2\n");
	}

	#[test]
	fn bcond_lines_stay_verbatim() {
		let mut db = MacroRegistry::new();
		let out = expand("%bcond_without system_ntirpc\n%if 0%{?with_system_ntirpc}\n1\n%else\nNot yet working.\n%endif\n", &mut db);
		assert_eq!(out, "%bcond_without system_ntirpc\nNot yet working.\n");
	}

	#[test]
	fn expression_snippets() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%[ 1 > 2 ]\n", &mut db), "0\n");
		assert_eq!(expand("%[ 2 + 2 ]\n", &mut db), "4\n");
		assert_eq!(expand("%[ 2 + 2 * 3 ]\n", &mut db), "8\n");
		assert_eq!(expand("%[ 1 ? \"a\" : \"b\" ]", &mut db), "a");
		assert_eq!(expand("%[ 0 ? \"a\" : \"b\" ]", &mut db), "b");
		assert_eq!(expand("%[!(0%{?rhel} >= 10)]", &mut db), "1");
		assert_eq!(expand("%[ \"1\" + \"10\" ]", &mut db), "110");
		let mut db = registry(&[("foo", "11")]);
		assert_eq!(expand("%[ 2 + 2 * %foo ]\n", &mut db), "24\n");
	}

	#[test]
	fn expression_failure_is_literal() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%[ \"10\" - \"2\" ]", &mut db), "%[ \"10\" - \"2\" ]");
	}

	#[test]
	fn expression_side_effects_follow_branches() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%[ \"0\" ? \"%{expand:%%global foo 1}\" : \"%{expand:%%global bar 1}\" ]", &mut db), "");
		assert!(db.contains("bar"));
		assert!(!db.contains("foo"));
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%[ 1 ? \"%{expand:%%global foo 1}\" : \"%{expand:%%global bar 1}\" ]", &mut db), "");
		assert!(db.contains("foo"));
		assert!(!db.contains("bar"));
	}

	#[test]
	fn expression_undefined_macros_count_as_zero() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%[ %{?_nonexistingsomething} > -1 ]\n%[ 0 || %{?_nonexistingsomething} ]\n", &mut db), "1\n0\n");
	}

	#[test]
	fn version_comparisons_in_spec() {
		let mut db = MacroRegistry::new();
		let out = expand(
			"%if v\"3.0\" < v\"5\"\nYES\n%endif\n%[ v\"1:2.5\" > v\"3.0\" ]\n%[ v\"0:2.5\" == v\"2.005\" ]\n%[ v\"0:2.5\" < v\"1:2.5\" ]\n",
			&mut db,
		);
		assert_eq!(out, "YES\n1\n1\n1\n");
	}

	#[test]
	fn dnl_swallows_line() {
		let mut db = MacroRegistry::new();
		let out = expand("%dnl %define foo bar\n%foo\n%dnl bar\n%{dnl aaa}after\n", &mut db);
		assert_eq!(out, "%foo\nafter\n");
	}

	#[test]
	fn defined_composition() {
		let mut db = MacroRegistry::new();
		let out = expand(
			"%dnl %define foo bar\n%define defined() %{expand:%%{?%{1}:1}%%{!?%{1}:0}}\n%defined foo\n%define foo bar\n%{defined:foo}\n%{defined: foo}\nend\n",
			&mut db,
		);
		assert_eq!(out, "0\n1\n%{? foo:1}%{!? foo:0}\nend\n");
	}

	#[test]
	fn len_builtin_forms() {
		let mut db = MacroRegistry::new();
		let out = expand("%global text  Hello   World\n%len %text\n%{len:%text}\n%{len: %text }\n", &mut db);
		assert_eq!(out, "5\n13\n15\n");
	}

	#[test]
	fn sub_builtin() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%{sub hello 1 3}", &mut db), "hel");
	}

	#[test]
	fn quote_and_len() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%{len:%{quote:a b  c}}", &mut db), "6");
	}

	#[test]
	fn gsub_composition() {
		let mut db = MacroRegistry::new();
		let out = expand(
			"%define foo %{quote:hello world. I like you!}\n%define bar %{gsub %foo hello hi}\n%define baz %{gsub %foo %w+ X}\n%bar\n%{gsub %foo o X}\n%{gsub %foo o X 1}\n%{gsub %foo %w X 1}\n%{gsub %foo %w+ X}\n%{len:%baz}\n%{len %baz}\n%{gsub %foo %. !}\n%{gsub %foo . _}\n",
			&mut db,
		);
		assert_eq!(
			out,
			"hi world. I like you!\nhellX wXrld. I like yXu!\nhellX world. I like you!\nXello world. I like you!\nX X. X X X!\n11\n1\nhello world! I like you!\n________________________\n"
		);
	}

	#[test]
	fn undefine_builtin() {
		let mut db = MacroRegistry::new();
		let out = expand("%define foo 1\n%define foo 2\n%foo\n%undefine foo\n%foo\n%undefine foo\n%foo\n", &mut db);
		// the %undefine lines leave their newlines behind
		assert_eq!(out, "2\n\n1\n\n%foo\n");
	}

	#[test]
	fn parametric_invocation() {
		let mut db = MacroRegistry::new();
		db.define("greet", "hi %-f* %1", Some("f:"), false).unwrap();
		assert_eq!(expand("%greet -f Mr Smith", &mut db), "hi Mr Smith");
		// bindings are gone afterwards
		for name in ["0", "1", "#", "*", "-f", "-f*"] {
			assert!(!db.contains(name), "{name} leaked");
		}
	}

	#[test]
	fn parametric_bindings() {
		let mut db = MacroRegistry::new();
		db.define("args", "0=%0 n=%# all=%{*} one=%1 two=%2", Some(""), false).unwrap();
		assert_eq!(expand("%args a b", &mut db), "0=args n=2 all=a b one=a two=b");
		assert_eq!(expand("%args", &mut db), "0=args n=0 all= one= two=");
	}

	#[test]
	fn parametric_flag_forms() {
		let mut db = MacroRegistry::new();
		db.define("opt", "[%{-f}] [%{-f*}] [%1]", Some("f:q"), false).unwrap();
		assert_eq!(expand("%opt -f val pos", &mut db), "[-f val] [val] [pos]");
		assert_eq!(expand("%opt pos", &mut db), "[] [] [pos]");
		assert_eq!(expand("%opt -q pos", &mut db), "[] [] [pos]");
	}

	#[test]
	fn unknown_option_leaves_call_literal() {
		let mut db = MacroRegistry::new();
		db.define("greet", "hi %1", Some("f:"), false).unwrap();
		assert_eq!(expand("%greet -z oops", &mut db), "%greet -z oops");
	}

	#[test]
	fn nested_parametric_calls_compose() {
		let mut db = MacroRegistry::new();
		db.define("inner", "<%1>", Some(""), false).unwrap();
		db.define("outer", "%inner y\n[%1]", Some(""), false).unwrap();
		// the outer %1 binding is restored once %inner returns
		assert_eq!(expand("%outer x", &mut db), "<y>\n[x]");
	}

	#[test]
	fn quoted_argument_stays_single() {
		let mut db = MacroRegistry::new();
		db.define("first", "%1", Some(""), false).unwrap();
		assert_eq!(expand("%first %{quote:a b  c}", &mut db), "a b  c");
	}

	#[test]
	fn shell_stays_opaque() {
		let mut db = MacroRegistry::new();
		assert_eq!(expand("%(some | shell)", &mut db), "%(some | shell)");
	}

	#[test]
	fn shell_cut_hack_rewrites_to_sub() {
		let mut db = registry(&[("version", "1.2.3")]);
		assert_eq!(expand("%(echo 1.2.3 | cut -c1-3)", &mut db), "1.2");
	}

	#[test]
	fn false_branch_suppresses_everything() {
		let mut db = MacroRegistry::new();
		let out = expand("%if 0\n%define foo bar\n%{len:abc}\ntext\n%endif\n%foo\n", &mut db);
		assert_eq!(out, "%foo\n");
		assert!(!db.contains("foo"));
	}

	#[test]
	fn nested_conditions_inside_false_branch() {
		let mut db = MacroRegistry::new();
		let out = expand("%if 0\n%if 1\nA\n%else\nB\n%endif\nC\n%endif\nD\n", &mut db);
		assert_eq!(out, "D\n");
	}

	#[test]
	fn empty_registry_idempotent_on_plain_text() {
		let mut db = MacroRegistry::new();
		let text = "no macros here\njust lines\n";
		assert_eq!(expand(text, &mut db), text);
		assert_eq!(expand("100%% sure\n", &mut db), "100% sure\n");
	}

	#[test]
	fn whole_specfile_pipeline() {
		let mut db = MacroRegistry::new();
		db.define("dist", ".fc43", None, false).unwrap();
		let spec = "\
%global srcname pkgtool\n\
%define want_docs 1\n\
Name: python-%srcname\n\
Version: 1.2.3\n\
Release: 4%{?dist}\n\
%if %want_docs\n\
BuildRequires: make\n\
%endif\n\
%prep\n\
echo %{name}-%{version}\n";
		let out = expand(spec, &mut db);
		assert_eq!(
			out,
			"Name: python-pkgtool\nVersion: 1.2.3\nRelease: 4.fc43\nBuildRequires: make\n%prep\necho python-pkgtool-1.2.3\n"
		);
		assert_eq!(db.get("name").unwrap().value(), "python-pkgtool");
		assert_eq!(db.get("release").unwrap().value(), "4.fc43");
	}

	#[test]
	fn cloned_registries_expand_independently() {
		let mut db = MacroRegistry::new();
		db.define("who", "world", None, false).unwrap();
		let mut other = db.clone();
		assert_eq!(expand("%define who moon\nhello %who", &mut other), "hello moon");
		// the original registry never saw the redefinition
		assert_eq!(expand("hello %who", &mut db), "hello world");
	}

	#[test]
	fn nodejs_style_version_split() {
		let mut db = MacroRegistry::new();
		db.define(
			"definever",
			"%{expand:%%global %{1}_evr %2}%{expand:%%global %{1}_noep %{gsub %2 %d+: %{quote:}}}",
			Some(""),
			false,
		)
		.unwrap();
		assert_eq!(expand("%definever foo 666:1.1.1-2\n%foo_evr\n%foo_noep\n", &mut db), "\n666:1.1.1-2\n1.1.1-2\n");
	}
}
