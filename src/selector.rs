//! The CSS selector subset understood by [`MemoryDom`](`crate::memory::MemoryDom`).
//!
//! Supported: `*`, type selectors, `#id`, `.class`, `[attr]` and `[attr=value]` (quoted or not),
//! compounds thereof, the descendant and child (`>`) combinators and comma-separated lists.
//! Type selectors match ASCII-case-insensitively.

use crate::Error;
use core::{iter::Peekable, str::Chars};

/// Borrowed view of one element, for matching.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ElementRef<'a> {
	pub tag: &'a str,
	pub attributes: &'a [(String, String)],
}

impl<'a> ElementRef<'a> {
	fn attribute(&self, name: &str) -> Option<&'a str> {
		self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selector {
	alternatives: Vec<Vec<(Combinator, Compound)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
	Descendant,
	Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
	tag: Option<String>,
	id: Option<String>,
	classes: Vec<String>,
	attributes: Vec<(String, Option<String>)>,
}

impl Selector {
	pub fn parse(selector: &str) -> Result<Self, Error> {
		let mut parser = Parser {
			source: selector,
			chars: selector.chars().peekable(),
		};
		let mut alternatives = vec![parser.complex()?];
		while parser.chars.next_if_eq(&',').is_some() {
			alternatives.push(parser.complex()?);
		}
		Ok(Self { alternatives })
	}

	/// `chain` is the subject element followed by its element ancestors, innermost first.
	pub fn matches(&self, chain: &[ElementRef<'_>]) -> bool {
		!chain.is_empty() && self.alternatives.iter().any(|parts| matches_from(parts, chain))
	}
}

fn matches_from(parts: &[(Combinator, Compound)], chain: &[ElementRef<'_>]) -> bool {
	let ((combinator, compound), rest) = match parts.split_last() {
		Some(split) => split,
		None => return true,
	};
	if !compound.matches(&chain[0]) {
		return false;
	}
	if rest.is_empty() {
		return true;
	}
	match combinator {
		Combinator::Child => chain.len() > 1 && matches_from(rest, &chain[1..]),
		Combinator::Descendant => (1..chain.len()).any(|i| matches_from(rest, &chain[i..])),
	}
}

impl Compound {
	fn is_universal(&self) -> bool {
		self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
	}

	fn matches(&self, element: &ElementRef<'_>) -> bool {
		if let Some(tag) = &self.tag {
			if !tag.eq_ignore_ascii_case(element.tag) {
				return false;
			}
		}
		if let Some(id) = &self.id {
			if element.attribute("id") != Some(id.as_str()) {
				return false;
			}
		}
		if !self.classes.is_empty() {
			let classes = element.attribute("class").unwrap_or_default();
			if !self.classes.iter().all(|class| classes.split_whitespace().any(|c| c == class)) {
				return false;
			}
		}
		self.attributes.iter().all(|(name, value)| match (element.attribute(name), value) {
			(None, _) => false,
			(Some(_), None) => true,
			(Some(actual), Some(expected)) => actual == expected,
		})
	}
}

struct Parser<'a> {
	source: &'a str,
	chars: Peekable<Chars<'a>>,
}

impl<'a> Parser<'a> {
	fn error(&self, reason: impl Into<String>) -> Error {
		Error::unsupported_selector(self.source, reason)
	}

	fn skip_whitespace(&mut self) {
		while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
	}

	fn complex(&mut self) -> Result<Vec<(Combinator, Compound)>, Error> {
		let mut parts = Vec::new();
		let mut combinator = Combinator::Descendant;
		let mut dangling = false;
		loop {
			self.skip_whitespace();
			match self.chars.peek().copied() {
				None | Some(',') => break,
				Some('>') => {
					if parts.is_empty() || dangling {
						return Err(self.error("misplaced `>`"));
					}
					self.chars.next();
					combinator = Combinator::Child;
					dangling = true;
				}
				Some(_) => {
					parts.push((combinator, self.compound()?));
					combinator = Combinator::Descendant;
					dangling = false;
				}
			}
		}
		if parts.is_empty() || dangling {
			return Err(self.error("expected a selector"));
		}
		Ok(parts)
	}

	fn compound(&mut self) -> Result<Compound, Error> {
		let mut compound = Compound::default();
		let mut universal = false;
		if self.chars.next_if_eq(&'*').is_some() {
			universal = true;
		} else if self.chars.peek().copied().map_or(false, is_ident_char) {
			compound.tag = Some(self.ident()?);
		}
		loop {
			match self.chars.peek().copied() {
				Some('#') => {
					self.chars.next();
					compound.id = Some(self.ident()?);
				}
				Some('.') => {
					self.chars.next();
					compound.classes.push(self.ident()?);
				}
				Some('[') => {
					self.chars.next();
					compound.attributes.push(self.attribute()?);
				}
				Some(':') => return Err(self.error("pseudo-classes are not supported")),
				Some(c) if c.is_whitespace() || c == ',' || c == '>' => break,
				None => break,
				Some(c) => return Err(self.error(format!("unexpected {:?}", c))),
			}
		}
		if compound.is_universal() && !universal {
			return Err(self.error("expected a selector"));
		}
		Ok(compound)
	}

	fn ident(&mut self) -> Result<String, Error> {
		let mut ident = String::new();
		while let Some(c) = self.chars.next_if(|&c| is_ident_char(c)) {
			ident.push(c);
		}
		if ident.is_empty() {
			return Err(self.error("expected an identifier"));
		}
		Ok(ident)
	}

	fn attribute(&mut self) -> Result<(String, Option<String>), Error> {
		self.skip_whitespace();
		let name = self.ident()?;
		self.skip_whitespace();
		let value = match self.chars.next() {
			Some(']') => return Ok((name, None)),
			Some('=') => {
				self.skip_whitespace();
				let value = match self.chars.peek().copied() {
					Some(quote @ ('"' | '\'')) => {
						self.chars.next();
						let mut value = String::new();
						loop {
							match self.chars.next() {
								Some(c) if c == quote => break value,
								Some(c) => value.push(c),
								None => return Err(self.error("unterminated string")),
							}
						}
					}
					_ => self.ident()?,
				};
				self.skip_whitespace();
				value
			}
			Some(c) => return Err(self.error(format!("attribute operator starting with {:?} is not supported", c))),
			None => return Err(self.error("unterminated attribute selector")),
		};
		match self.chars.next() {
			Some(']') => Ok((name, Some(value))),
			_ => Err(self.error("expected `]`")),
		}
	}
}

fn is_ident_char(c: char) -> bool {
	c.is_alphanumeric() || c == '-' || c == '_'
}
