//! Specification model.
//!
//! A specification is an infix formula over a declared proposition set using
//! `AND`, `OR`, `NOT` and at most one top-level `UNTIL`:
//!
//! ```text
//! (child plays with kite AND child runs around) UNTIL child falls
//! robots stand silently UNTIL (red robot blinks OR NOT green robot turns off)
//! ```
//!
//! Proposition names may span several words and may be double-quoted.
//! `&`, `|`, `!` and `~` are accepted as symbolic forms of `AND`, `OR` and
//! `NOT`. Binding, loosest first: `UNTIL`, `OR`, `AND`, `NOT`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter;

use orbit_models::{Proposition, Split};

use crate::error::{FormatError, FormatResult};

/// Specification AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Prop(Proposition),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Not(Box<Formula>),
    Until(Box<Formula>, Box<Formula>),
}

impl Formula {
    /// Propositions in left-to-right order of appearance.
    pub fn propositions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_propositions(&mut out);
        out
    }

    fn collect_propositions<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Formula::Prop(name) => out.push(name),
            Formula::And(l, r) | Formula::Or(l, r) | Formula::Until(l, r) => {
                l.collect_propositions(out);
                r.collect_propositions(out);
            }
            Formula::Not(x) => x.collect_propositions(out),
        }
    }

    fn until_count(&self) -> usize {
        match self {
            Formula::Prop(_) => 0,
            Formula::And(l, r) | Formula::Or(l, r) => l.until_count() + r.until_count(),
            Formula::Until(l, r) => 1 + l.until_count() + r.until_count(),
            Formula::Not(x) => x.until_count(),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Prop(name) => write!(f, "\"{}\"", name),
            Formula::And(l, r) => write!(f, "({} AND {})", l, r),
            Formula::Or(l, r) => write!(f, "({} OR {})", l, r),
            Formula::Not(x) => write!(f, "(NOT {})", x),
            Formula::Until(l, r) => write!(f, "({} UNTIL {})", l, r),
        }
    }
}

/// A validated specification: every declared proposition occurs exactly once.
#[derive(Debug, Clone)]
pub struct Specification {
    propositions: Vec<Proposition>,
    formula: Formula,
    splits: BTreeMap<Proposition, Split>,
}

impl Specification {
    /// Parse `formula` against the declared `propositions`.
    pub fn new<I, S>(propositions: I, formula: &str) -> FormatResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Proposition>,
    {
        let propositions: Vec<Proposition> = propositions.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for prop in &propositions {
            if !seen.insert(prop.as_str()) {
                return Err(FormatError::DuplicateDeclaration(prop.clone()));
            }
        }

        let tokens = tokenize(formula)?;
        if tokens.is_empty() {
            return Err(FormatError::Empty);
        }

        let mut parser = Parser {
            tokens: tokens.into_iter().peekable(),
            declared: &propositions,
        };
        let formula = parser.parse()?;

        match formula.until_count() {
            0 | 1 => {}
            _ => return Err(FormatError::MultipleUntil),
        }
        if let Formula::Until(l, r) = &formula {
            if l.until_count() + r.until_count() > 0 {
                return Err(FormatError::MultipleUntil);
            }
        } else if formula.until_count() > 0 {
            return Err(FormatError::NestedUntil);
        }

        let used = formula.propositions();
        for prop in &propositions {
            match used.iter().filter(|u| **u == prop.as_str()).count() {
                0 => return Err(FormatError::UnusedProposition(prop.clone())),
                1 => {}
                _ => return Err(FormatError::RepeatedProposition(prop.clone())),
            }
        }

        let splits = compute_splits(&formula);

        Ok(Self {
            propositions,
            formula,
            splits,
        })
    }

    /// Which side of the top-level `UNTIL` `prop` belongs to.
    ///
    /// Every proposition is `Split::Before` when there is no `UNTIL`.
    pub fn check_split(&self, prop: &str) -> FormatResult<Split> {
        self.splits
            .get(prop)
            .copied()
            .ok_or_else(|| FormatError::UnknownProposition(prop.to_string()))
    }

    /// Declared propositions, in declaration order.
    pub fn propositions(&self) -> &[Proposition] {
        &self.propositions
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn has_until(&self) -> bool {
        matches!(self.formula, Formula::Until(_, _))
    }

    pub fn contains(&self, prop: &str) -> bool {
        self.splits.contains_key(prop)
    }
}

impl fmt::Display for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formula)
    }
}

fn compute_splits(formula: &Formula) -> BTreeMap<Proposition, Split> {
    let mut splits = BTreeMap::new();
    match formula {
        Formula::Until(l, r) => {
            for prop in l.propositions() {
                splits.insert(prop.to_string(), Split::Before);
            }
            for prop in r.propositions() {
                splits.insert(prop.to_string(), Split::After);
            }
        }
        other => {
            for prop in other.propositions() {
                splits.insert(prop.to_string(), Split::Before);
            }
        }
    }
    splits
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Until,
    Word(String),
    Quoted(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::Until => "UNTIL".to_string(),
            Token::Word(w) => w.clone(),
            Token::Quoted(q) => format!("\"{}\"", q),
        }
    }
}

const OPERATOR_CHARS: &[char] = &['&', '|', '!', '~', '<', '>', '=', '^'];

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')' && c != '"' && !OPERATOR_CHARS.contains(&c)
}

fn tokenize(input: &str) -> FormatResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '"' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|&ch| ch == '"')
                .map(|offset| start + offset)
                .ok_or(FormatError::UnterminatedQuote)?;
            let name: String = chars[start..end].iter().collect();
            tokens.push(Token::Quoted(name.trim().to_string()));
            i = end + 1;
        } else if OPERATOR_CHARS.contains(&c)
            || (c == '-' && chars.get(i + 1).is_some_and(|n| OPERATOR_CHARS.contains(n)))
        {
            let start = i;
            while i < chars.len() && (OPERATOR_CHARS.contains(&chars[i]) || chars[i] == '-') {
                i += 1;
            }
            let op: String = chars[start..i].iter().collect();
            tokens.push(match op.as_str() {
                "&" | "&&" => Token::And,
                "|" | "||" => Token::Or,
                "!" | "~" => Token::Not,
                _ => return Err(FormatError::UnknownOperator(op)),
            });
        } else {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "AND" => Token::And,
                "OR" => Token::Or,
                "NOT" => Token::Not,
                "UNTIL" => Token::Until,
                _ => Token::Word(word),
            });
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    tokens: Peekable<IntoIter<Token>>,
    declared: &'a [Proposition],
}

impl<'a> Parser<'a> {
    fn parse(&mut self) -> FormatResult<Formula> {
        let formula = self.parse_until(None)?;
        match self.tokens.next() {
            None => Ok(formula),
            Some(Token::RParen) => Err(FormatError::UnbalancedParentheses),
            Some(other) => Err(FormatError::UnexpectedToken(other.describe())),
        }
    }

    fn parse_until(&mut self, pending: Option<&'static str>) -> FormatResult<Formula> {
        let left = self.parse_or(pending)?;
        if self.tokens.peek() != Some(&Token::Until) {
            return Ok(left);
        }
        self.tokens.next();
        let right = self.parse_or(Some("UNTIL"))?;
        if self.tokens.peek() == Some(&Token::Until) {
            return Err(FormatError::MultipleUntil);
        }
        Ok(Formula::Until(Box::new(left), Box::new(right)))
    }

    fn parse_or(&mut self, pending: Option<&'static str>) -> FormatResult<Formula> {
        let mut left = self.parse_and(pending)?;
        while self.tokens.peek() == Some(&Token::Or) {
            self.tokens.next();
            let right = self.parse_and(Some("OR"))?;
            left = Formula::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self, pending: Option<&'static str>) -> FormatResult<Formula> {
        let mut left = self.parse_unary(pending)?;
        while self.tokens.peek() == Some(&Token::And) {
            self.tokens.next();
            let right = self.parse_unary(Some("AND"))?;
            left = Formula::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self, pending: Option<&'static str>) -> FormatResult<Formula> {
        if self.tokens.peek() == Some(&Token::Not) {
            self.tokens.next();
            let inner = self.parse_unary(Some("NOT"))?;
            return Ok(Formula::Not(Box::new(inner)));
        }
        self.parse_primary(pending)
    }

    fn parse_primary(&mut self, pending: Option<&'static str>) -> FormatResult<Formula> {
        let missing = |found: Option<&Token>| {
            let operator = match (pending, found) {
                (Some(op), _) => op,
                (None, Some(Token::And)) => "AND",
                (None, Some(Token::Or)) => "OR",
                (None, Some(Token::Until)) => "UNTIL",
                (None, _) => "expression",
            };
            FormatError::missing_operand(operator)
        };

        match self.tokens.next() {
            Some(Token::LParen) => {
                if self.tokens.peek() == Some(&Token::RParen) {
                    return Err(FormatError::missing_operand("()"));
                }
                let inner = self.parse_until(None)?;
                match self.tokens.next() {
                    Some(Token::RParen) => Ok(inner),
                    None => Err(FormatError::UnbalancedParentheses),
                    Some(other) => Err(FormatError::UnexpectedToken(other.describe())),
                }
            }
            Some(Token::Quoted(name)) => self.resolve(name),
            Some(Token::Word(first)) => {
                let mut words = vec![first];
                while let Some(Token::Word(word)) =
                    self.tokens.next_if(|t| matches!(t, Token::Word(_)))
                {
                    words.push(word);
                }
                self.resolve(words.join(" "))
            }
            Some(Token::RParen) if pending.is_none() => Err(FormatError::UnbalancedParentheses),
            found => Err(missing(found.as_ref())),
        }
    }

    /// Map a word run to a declared proposition.
    fn resolve(&self, name: String) -> FormatResult<Formula> {
        if self.declared.iter().any(|p| p == &name) {
            return Ok(Formula::Prop(name));
        }

        // An upper-case keyword that is not part of any declared name is an
        // operator this grammar does not support (IMPLIES, EVENTUALLY, ...).
        let declared_words: HashSet<&str> = self
            .declared
            .iter()
            .flat_map(|p| p.split_whitespace())
            .collect();
        if let Some(op) = name.split_whitespace().find(|w| {
            w.len() > 1
                && w.chars().all(|c| c.is_ascii_uppercase())
                && !declared_words.contains(w)
        }) {
            return Err(FormatError::UnknownOperator(op.to_string()));
        }

        Err(FormatError::UnknownProposition(name))
    }
}
