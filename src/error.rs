use smartstring::alias::String;

/// Typed failures raised by the expansion engine.
///
/// Everything else (unknown macros, malformed `%[...]`, strange shell
/// constructs) is non-fatal and passes the original text through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
	/// Malformed expression body in `%[...]` or `%if`.
	Syntax(String),
	/// Structural error in conditional blocks (`%if %if`, double `%else`, ...).
	Parse(String),
	/// Expansion depth went past the limit.
	Recursion,
	/// Invalid macro name at assignment time.
	Name(String),
	/// Parametric call used an option missing from the parameter spec.
	UnknownOption(char),
}

impl std::fmt::Display for ExpandError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Syntax(msg) => write!(f, "expression syntax error: {msg}"),
			Self::Parse(msg) => write!(f, "parse error: {msg}"),
			Self::Recursion => {
				write!(f, "Too many levels of recursion in macro expansion. It is likely caused by recursive macro declaration.")
			}
			Self::Name(name) => write!(f, "`{name}` is not a valid macro name"),
			Self::UnknownOption(opt) => write!(f, "unknown option `-{opt}` in parameterized macro"),
		}
	}
}

impl std::error::Error for ExpandError {}
