//! RPM epoch-version-release comparison.

use smartstring::alias::String;
use std::cmp::Ordering;

/// Parsed `[epoch:]version[-release]` triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evr {
	pub epoch: u64,
	pub version: String,
	pub release: String,
}

impl From<&str> for Evr {
	fn from(value: &str) -> Self {
		let mut evr = Self::default();
		let mut rest = value;
		if let Some((e, v)) = rest.split_once(':') {
			if !e.is_empty() && e.chars().all(|c| c.is_ascii_digit()) {
				evr.epoch = e.parse().unwrap_or(0);
				rest = v;
			}
		}
		if let Some(pos) = rest.rfind('-') {
			evr.version = rest[..pos].into();
			evr.release = rest[pos + 1..].into();
		} else {
			evr.version = rest.into();
		}
		evr
	}
}

fn is_version_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '~' || c == '^'
}

/// Segment-wise comparison of two version strings, the RPM way: numeric
/// segments beat alphabetic ones, leading zeros are insignificant, `~`
/// sorts before everything (even end of string), `^` sorts after end of
/// string but before any further segment.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
	let mut one: &str = a;
	let mut two: &str = b;
	while !one.is_empty() || !two.is_empty() {
		one = one.trim_start_matches(|c| !is_version_char(c));
		two = two.trim_start_matches(|c| !is_version_char(c));
		let c1 = one.chars().next();
		let c2 = two.chars().next();
		if c1 == Some('~') || c2 == Some('~') {
			if c1 != Some('~') {
				return Ordering::Greater;
			}
			if c2 != Some('~') {
				return Ordering::Less;
			}
			one = &one[1..];
			two = &two[1..];
			continue;
		}
		if c1 == Some('^') || c2 == Some('^') {
			if c1.is_none() {
				return Ordering::Less;
			}
			if c2.is_none() {
				return Ordering::Greater;
			}
			if c1 != Some('^') {
				return Ordering::Greater;
			}
			if c2 != Some('^') {
				return Ordering::Less;
			}
			one = &one[1..];
			two = &two[1..];
			continue;
		}
		let (Some(c1), Some(_)) = (c1, c2) else { break };
		// both sides look at the segment type the left side starts with
		let numeric = c1.is_ascii_digit();
		let take = |s: &str, num: bool| -> usize {
			s.find(|c: char| if num { !c.is_ascii_digit() } else { !c.is_ascii_alphabetic() }).unwrap_or(s.len())
		};
		let l1 = take(one, numeric);
		let l2 = take(two, numeric);
		if l2 == 0 {
			// segment types differ: numbers beat letters
			return if numeric { Ordering::Greater } else { Ordering::Less };
		}
		let (s1, s2) = (&one[..l1], &two[..l2]);
		let ord = if numeric {
			let t1 = s1.trim_start_matches('0');
			let t2 = s2.trim_start_matches('0');
			t1.len().cmp(&t2.len()).then_with(|| t1.cmp(t2))
		} else {
			s1.cmp(s2)
		};
		if ord != Ordering::Equal {
			return ord;
		}
		one = &one[l1..];
		two = &two[l2..];
	}
	if one.is_empty() && two.is_empty() {
		return Ordering::Equal;
	}
	if one.is_empty() {
		Ordering::Less
	} else {
		Ordering::Greater
	}
}

/// Compare two EVR strings.  Releases only weigh in when both sides
/// carry one.
pub fn evr_cmp(a: &str, b: &str) -> Ordering {
	let (ea, eb) = (Evr::from(a), Evr::from(b));
	let ord = ea.epoch.cmp(&eb.epoch).then_with(|| rpmvercmp(&ea.version, &eb.version));
	if ord != Ordering::Equal {
		return ord;
	}
	if ea.release.is_empty() || eb.release.is_empty() {
		return Ordering::Equal;
	}
	rpmvercmp(&ea.release, &eb.release)
}
