// Copyright 2024 Strand Project
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Strings generated from a regular expression.
//!
//! Only a subset of the syntax is understood by the generator: literals,
//! escapes (`\d`, `\w`, `\s` and their negations), character classes with
//! ranges, `.`, groups, alternation and the quantifiers `?`, `*`, `+`,
//! `{n}`, `{n,}` and `{n,m}`. Anchors are accepted and ignored. Validity is
//! always checked against the full pattern with the `regex` crate.

use crate::errors::SearchError;
use crate::randomness::Randomness;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extra repetitions allowed for `*`, `+` and `{n,}`.
const UNBOUNDED_EXTRA_REPETITIONS: u32 = 5;

/// Alphabet for `.` and negated classes.
const PRINTABLE_ASCII: std::ops::RangeInclusive<u8> = 0x20..=0x7e;

const FORCE_NEW_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RxNode {
    Literal(char),
    Class { ranges: Vec<(char, char)>, negated: bool },
    Any,
    Seq(Vec<RxNode>),
    Alt(Vec<RxNode>),
    Repeat { node: Box<RxNode>, min: u32, max: u32 },
}

impl RxNode {
    fn has_alternatives(&self) -> bool {
        match self {
            RxNode::Literal(_) => false,
            RxNode::Class { ranges, negated } => {
                *negated || ranges.iter().map(|(a, b)| *b as u32 - *a as u32 + 1).sum::<u32>() > 1
            }
            RxNode::Any => true,
            RxNode::Seq(nodes) => nodes.iter().any(RxNode::has_alternatives),
            RxNode::Alt(options) => options.len() > 1 || options.iter().any(RxNode::has_alternatives),
            RxNode::Repeat { node, min, max } => {
                (min < max) || (*max > 0 && node.has_alternatives())
            }
        }
    }

    fn generate(&self, rng: &mut Randomness, out: &mut String) {
        match self {
            RxNode::Literal(c) => out.push(*c),
            RxNode::Class { ranges, negated: false } => {
                let sizes: Vec<f64> = ranges
                    .iter()
                    .map(|(a, b)| (*b as u32 - *a as u32 + 1) as f64)
                    .collect();
                if let Some(i) = rng.choose_weighted_index(&sizes) {
                    let (lo, hi) = ranges[i];
                    let code = rng.next_i64(lo as i64, hi as i64) as u32;
                    out.push(char::from_u32(code).unwrap_or(lo));
                }
            }
            RxNode::Class { ranges, negated: true } => {
                let allowed: Vec<char> = PRINTABLE_ASCII
                    .map(char::from)
                    .filter(|c| !ranges.iter().any(|(a, b)| c >= a && c <= b))
                    .collect();
                if let Some(c) = rng.choose(&allowed) {
                    out.push(*c);
                }
            }
            RxNode::Any => out.push(rng.next_word_char()),
            RxNode::Seq(nodes) => {
                for node in nodes {
                    node.generate(rng, out);
                }
            }
            RxNode::Alt(options) => {
                if let Some(option) = rng.choose(options) {
                    option.generate(rng, out);
                }
            }
            RxNode::Repeat { node, min, max } => {
                let times = rng.next_i64(*min as i64, *max as i64);
                for _ in 0..times {
                    node.generate(rng, out);
                }
            }
        }
    }

    /// Shortest, first-choice string of the language.
    fn minimal(&self, out: &mut String) {
        match self {
            RxNode::Literal(c) => out.push(*c),
            RxNode::Class { ranges, negated: false } => {
                if let Some((lo, _)) = ranges.first() {
                    out.push(*lo);
                }
            }
            RxNode::Class { ranges, negated: true } => {
                if let Some(c) = PRINTABLE_ASCII
                    .map(char::from)
                    .find(|c| !ranges.iter().any(|(a, b)| c >= a && c <= b))
                {
                    out.push(c);
                }
            }
            RxNode::Any => out.push('a'),
            RxNode::Seq(nodes) => nodes.iter().for_each(|n| n.minimal(out)),
            RxNode::Alt(options) => {
                if let Some(first) = options.first() {
                    first.minimal(out);
                }
            }
            RxNode::Repeat { node, min, .. } => {
                for _ in 0..*min {
                    node.minimal(out);
                }
            }
        }
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    pattern: &'a str,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            chars: pattern.chars().collect(),
            pos: 0,
            pattern,
        }
    }

    fn error(&self, message: &str) -> SearchError {
        SearchError::ConfigError(format!(
            "unsupported regex '{}' at {}: {}",
            self.pattern, self.pos, message
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse(mut self) -> Result<RxNode, SearchError> {
        let node = self.parse_alt()?;
        if self.pos < self.chars.len() {
            return Err(self.error("unbalanced ')'"));
        }
        Ok(node)
    }

    fn parse_alt(&mut self) -> Result<RxNode, SearchError> {
        let mut options = vec![self.parse_seq()?];
        while self.eat('|') {
            options.push(self.parse_seq()?);
        }
        Ok(if options.len() == 1 {
            options.remove(0)
        } else {
            RxNode::Alt(options)
        })
    }

    fn parse_seq(&mut self) -> Result<RxNode, SearchError> {
        let mut nodes = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            let Some(atom) = self.parse_atom()? else {
                continue;
            };
            nodes.push(self.parse_quantifier(atom)?);
        }
        Ok(RxNode::Seq(nodes))
    }

    fn parse_atom(&mut self) -> Result<Option<RxNode>, SearchError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unexpected end"));
        };
        let node = match c {
            '^' | '$' => return Ok(None),
            '(' => {
                if self.eat('?') && !self.eat(':') {
                    return Err(self.error("only non-capturing groups are supported"));
                }
                let inner = self.parse_alt()?;
                if !self.eat(')') {
                    return Err(self.error("missing ')'"));
                }
                inner
            }
            '[' => self.parse_class()?,
            '.' => RxNode::Any,
            '\\' => self.parse_escape()?,
            '*' | '+' | '?' | '{' => return Err(self.error("quantifier without operand")),
            other => RxNode::Literal(other),
        };
        Ok(Some(node))
    }

    fn parse_escape(&mut self) -> Result<RxNode, SearchError> {
        let Some(c) = self.bump() else {
            return Err(self.error("dangling escape"));
        };
        Ok(match c {
            'd' => class(&[('0', '9')], false),
            'D' => class(&[('0', '9')], true),
            'w' => class(&WORD_RANGES, false),
            'W' => class(&WORD_RANGES, true),
            's' => class(&[(' ', ' '), ('\t', '\t')], false),
            'S' => class(&[(' ', ' '), ('\t', '\t')], true),
            'n' => RxNode::Literal('\n'),
            't' => RxNode::Literal('\t'),
            other if other.is_ascii_alphanumeric() => {
                return Err(self.error("unsupported escape"));
            }
            other => RxNode::Literal(other),
        })
    }

    fn class_char(&mut self) -> Result<char, SearchError> {
        match self.bump() {
            Some('\\') => match self.bump() {
                Some('n') => Ok('\n'),
                Some('t') => Ok('\t'),
                Some(c) => Ok(c),
                None => Err(self.error("dangling escape in class")),
            },
            Some(c) => Ok(c),
            None => Err(self.error("missing ']'")),
        }
    }

    fn parse_class(&mut self) -> Result<RxNode, SearchError> {
        let negated = self.eat('^');
        let mut ranges = Vec::new();
        let mut first = true;
        loop {
            match self.peek() {
                None => return Err(self.error("missing ']'")),
                Some(']') if !first => {
                    self.pos += 1;
                    break;
                }
                Some('\\') if matches!(self.chars.get(self.pos + 1), Some('d' | 'w' | 's')) => {
                    self.pos += 1;
                    match self.bump() {
                        Some('d') => ranges.push(('0', '9')),
                        Some('w') => ranges.extend_from_slice(&WORD_RANGES),
                        _ => ranges.extend_from_slice(&[(' ', ' '), ('\t', '\t')]),
                    }
                }
                Some(_) => {
                    let lo = self.class_char()?;
                    if self.peek() == Some('-') && self.chars.get(self.pos + 1).is_some_and(|c| *c != ']') {
                        self.pos += 1;
                        let hi = self.class_char()?;
                        if hi < lo {
                            return Err(self.error("reversed class range"));
                        }
                        ranges.push((lo, hi));
                    } else {
                        ranges.push((lo, lo));
                    }
                }
            }
            first = false;
        }
        Ok(RxNode::Class { ranges, negated })
    }

    fn parse_quantifier(&mut self, atom: RxNode) -> Result<RxNode, SearchError> {
        let (min, max) = match self.peek() {
            Some('?') => (0, 1),
            Some('*') => (0, UNBOUNDED_EXTRA_REPETITIONS),
            Some('+') => (1, 1 + UNBOUNDED_EXTRA_REPETITIONS),
            Some('{') => {
                self.pos += 1;
                let min = self.parse_number()?;
                let max = if self.eat(',') {
                    if self.peek() == Some('}') {
                        min + UNBOUNDED_EXTRA_REPETITIONS
                    } else {
                        self.parse_number()?
                    }
                } else {
                    min
                };
                if !self.eat('}') || max < min {
                    return Err(self.error("malformed repetition"));
                }
                // lazy marker
                self.eat('?');
                return Ok(RxNode::Repeat { node: Box::new(atom), min, max });
            }
            _ => return Ok(atom),
        };
        self.pos += 1;
        self.eat('?');
        Ok(RxNode::Repeat { node: Box::new(atom), min, max })
    }

    fn parse_number(&mut self) -> Result<u32, SearchError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits.parse().map_err(|_| self.error("expected a number"))
    }
}

const WORD_RANGES: [(char, char); 4] = [('a', 'z'), ('A', 'Z'), ('0', '9'), ('_', '_')];

fn class(ranges: &[(char, char)], negated: bool) -> RxNode {
    RxNode::Class {
        ranges: ranges.to_vec(),
        negated,
    }
}

/// A string constrained by a regular expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexGene {
    pub pattern: String,
    pub tree: RxNode,
    pub value: String,
    #[serde(skip)]
    compiled: CompiledPattern,
}

/// Full-match regex of a pattern, compiled on first use.
#[derive(Debug, Clone, Default)]
struct CompiledPattern(OnceCell<Option<Regex>>);

impl PartialEq for CompiledPattern {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl RegexGene {
    /// Parses `pattern`; fails with a configuration error when the pattern is
    /// outside the supported subset or not a valid regex at all.
    pub fn new(pattern: &str) -> Result<Self, SearchError> {
        let re = full_match(pattern)?;
        let tree = Parser::new(pattern).parse()?;
        let mut value = String::new();
        tree.minimal(&mut value);
        Ok(Self {
            pattern: pattern.to_string(),
            tree,
            value,
            compiled: CompiledPattern(OnceCell::with_value(Some(re))),
        })
    }

    fn matcher(&self) -> Option<&Regex> {
        self.compiled
            .0
            .get_or_init(|| full_match(&self.pattern).ok())
            .as_ref()
    }

    pub fn has_alternatives(&self) -> bool {
        self.tree.has_alternatives()
    }

    pub fn is_locally_valid(&self) -> bool {
        self.matcher().map_or(false, |re| re.is_match(&self.value))
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        let previous = std::mem::take(&mut self.value);
        for _ in 0..FORCE_NEW_ATTEMPTS {
            let mut candidate = String::new();
            self.tree.generate(rng, &mut candidate);
            self.value = candidate;
            if !force_new || self.value != previous || !self.has_alternatives() {
                return;
            }
        }
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let Value::String(text) = json else {
            return Err(format!("cannot bind {} to a pattern string", json));
        };
        let re = self
            .matcher()
            .ok_or_else(|| format!("invalid regex '{}'", self.pattern))?;
        if !re.is_match(text) {
            return Err(format!("'{}' does not match /{}/", text, self.pattern));
        }
        self.value = text.clone();
        Ok(())
    }
}

fn full_match(pattern: &str) -> Result<Regex, SearchError> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| SearchError::ConfigError(format!("invalid regex '{}': {}", pattern, e)))
}
