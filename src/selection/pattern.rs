use super::SelectionError;
use std::fmt;

/// One matcher step inside a path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Char(char),
    AnyChar,
    Star,
    Class { negated: bool, ranges: Vec<(char, char)> },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Char(expected) => *expected == c,
            Token::AnyChar => c != '/',
            Token::Star => true,
            Token::Class { negated, ranges } => {
                let hit = ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
                hit != *negated
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: zero or more whole segments.
    AnyDepth,
    Tokens(Vec<Token>),
}

/// A glob compiled once at configuration time and evaluated against artifact names.
///
/// Patterns without a `/` are anchored to the last path segment, so `*Test`
/// selects both `FooTest` and `org/example/FooTest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    source: String,
    segments: Vec<Segment>,
}

impl GlobPattern {
    pub fn compile(pattern: &str) -> Result<Self, SelectionError> {
        if pattern.is_empty() {
            return Err(SelectionError::EmptyPattern);
        }

        let raw_segments = split_segments(pattern)?;
        let mut segments = Vec::new();
        if raw_segments.len() == 1 && pattern != "**" {
            segments.push(Segment::AnyDepth);
        }

        for raw in raw_segments {
            if raw.is_empty() {
                return Err(SelectionError::EmptySegment {
                    pattern: pattern.to_string(),
                });
            }
            if raw == "**" {
                // Consecutive `**` segments collapse into one.
                if segments.last() != Some(&Segment::AnyDepth) {
                    segments.push(Segment::AnyDepth);
                }
                continue;
            }
            segments.push(Segment::Tokens(parse_segment(pattern, raw)?));
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Case-sensitive match against a `/`-separated artifact name.
    pub fn matches(&self, name: &str) -> bool {
        let parts: Vec<&str> = name.split('/').collect();
        match_segments(&self.segments, &parts)
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split on unescaped `/`. Names never contain `/` inside a segment, so an
/// escaped separator could match nothing and is rejected.
fn split_segments(pattern: &str) -> Result<Vec<&str>, SelectionError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in pattern.char_indices() {
        if escaped {
            if c == '/' {
                return Err(SelectionError::EscapedSeparator {
                    pattern: pattern.to_string(),
                });
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '/' {
            segments.push(&pattern[start..i]);
            start = i + 1;
        }
    }
    segments.push(&pattern[start..]);
    Ok(segments)
}

fn parse_segment(pattern: &str, raw: &str) -> Result<Vec<Token>, SelectionError> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    return Err(SelectionError::MisplacedDoubleStar {
                        pattern: pattern.to_string(),
                    });
                }
                tokens.push(Token::Star);
            }
            '?' => tokens.push(Token::AnyChar),
            '\\' => match chars.next() {
                Some(escaped) => tokens.push(Token::Char(escaped)),
                None => {
                    return Err(SelectionError::DanglingEscape {
                        pattern: pattern.to_string(),
                    })
                }
            },
            '[' => {
                let negated = matches!(chars.peek(), Some('!') | Some('^'));
                if negated {
                    chars.next();
                }
                let mut body = Vec::new();
                // A `]` right after the opening bracket is a member, as in POSIX.
                if chars.peek() == Some(&']') {
                    chars.next();
                    body.push(']');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed {
                    return Err(SelectionError::UnclosedClass {
                        pattern: pattern.to_string(),
                    });
                }
                tokens.push(Token::Class {
                    negated,
                    ranges: parse_class(pattern, &body)?,
                });
            }
            other => tokens.push(Token::Char(other)),
        }
    }

    Ok(tokens)
}

fn parse_class(pattern: &str, body: &[char]) -> Result<Vec<(char, char)>, SelectionError> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < body.len() {
        // `a-z` is a range; a `-` at either edge is literal.
        if i + 2 < body.len() && body[i + 1] == '-' {
            let (start, end) = (body[i], body[i + 2]);
            if start > end {
                return Err(SelectionError::ReversedRange {
                    pattern: pattern.to_string(),
                    start,
                    end,
                });
            }
            ranges.push((start, end));
            i += 3;
        } else {
            ranges.push((body[i], body[i]));
            i += 1;
        }
    }
    Ok(ranges)
}

fn match_segments(pattern: &[Segment], name: &[&str]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=name.len()).any(|skip| match_segments(rest, &name[skip..]))
        }
        Some((Segment::Tokens(tokens), rest)) => match name.split_first() {
            Some((head, tail)) => {
                let text: Vec<char> = head.chars().collect();
                match_tokens(tokens, &text) && match_segments(rest, tail)
            }
            None => false,
        },
    }
}

/// Wildcard match with single-star backtracking.
fn match_tokens(tokens: &[Token], text: &[char]) -> bool {
    let (mut t, mut s) = (0, 0);
    let mut resume: Option<(usize, usize)> = None;

    while s < text.len() {
        if t < tokens.len() {
            if tokens[t] == Token::Star {
                resume = Some((t, s));
                t += 1;
                continue;
            }
            if tokens[t].matches(text[s]) {
                t += 1;
                s += 1;
                continue;
            }
        }
        match resume {
            Some((star_at, consumed)) => {
                t = star_at + 1;
                s = consumed + 1;
                resume = Some((star_at, consumed + 1));
            }
            None => return false,
        }
    }

    tokens[t..].iter().all(|tok| *tok == Token::Star)
}
