//! Element-level rules for decoded XML resources.
//!
//! Elements are located by parsing opening tags with `nom`, which tolerates
//! attributes in any order and tags that span several lines. Nothing beyond
//! the located elements is parsed, so the rest of the document is preserved
//! byte for byte.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::value;
use nom::multi::many0;
use nom::sequence::{delimited, preceded, separated_pair};
use nom::IResult;
use regex::Regex;

use crate::error::PatchResult;
use crate::rules::{ContentRule, Rewrite};

/// One located element, as a byte range of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element<'a> {
    pub start: usize,
    pub end: usize,
    pub name: &'a str,
    pub attributes: Vec<(&'a str, &'a str)>,
}

impl<'a> Element<'a> {
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }
}

struct OpenTag<'a> {
    name: &'a str,
    attributes: Vec<(&'a str, &'a str)>,
    self_closing: bool,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ':' | '-' | '_' | '.')
}

fn quoted_value(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
    ))(input)
}

fn attribute(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_while1(is_name_char),
        delimited(multispace0, char('='), multispace0),
        quoted_value,
    )(input)
}

fn open_tag(input: &str) -> IResult<&str, OpenTag<'_>> {
    let (input, _) = char('<')(input)?;
    let (input, name) = take_while1(is_name_char)(input)?;
    let (input, attributes) = many0(preceded(multispace1, attribute))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, self_closing) = alt((value(true, tag("/>")), value(false, tag(">"))))(input)?;
    Ok((
        input,
        OpenTag {
            name,
            attributes,
            self_closing,
        },
    ))
}

/// Byte offset just past a `</name>` closing tag starting at `at`.
fn close_tag_end(text: &str, at: usize, name: &str) -> Option<usize> {
    let rest = text[at..].strip_prefix("</")?.strip_prefix(name)?;
    let trimmed = rest.trim_start();
    if trimmed.starts_with('>') {
        Some(text.len() - trimmed.len() + 1)
    } else {
        None
    }
}

fn skip_comment(text: &str, at: usize) -> Option<usize> {
    if text[at..].starts_with("<!--") {
        let end = text[at + 4..].find("-->").map_or(text.len(), |i| at + 4 + i + 3);
        Some(end)
    } else {
        None
    }
}

/// Finds the end of a paired element whose opening tag ends at `from`.
fn matching_close(text: &str, from: usize, name: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(off) = text[pos..].find('<') {
        let at = pos + off;
        if let Some(end) = skip_comment(text, at) {
            pos = end;
            continue;
        }
        if let Some(end) = close_tag_end(text, at, name) {
            depth -= 1;
            if depth == 0 {
                return Some(end);
            }
            pos = end;
            continue;
        }
        if let Ok((rest, t)) = open_tag(&text[at..]) {
            if t.name == name && !t.self_closing {
                depth += 1;
            }
            pos = text.len() - rest.len();
            continue;
        }
        pos = at + 1;
    }
    None
}

/// All complete elements named `name`, outermost first, skipping comments.
pub fn find_elements<'a>(text: &'a str, name: &str) -> Vec<Element<'a>> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(off) = text[pos..].find('<') {
        let at = pos + off;
        if let Some(end) = skip_comment(text, at) {
            pos = end;
            continue;
        }
        match open_tag(&text[at..]) {
            Ok((rest, t)) if t.name == name => {
                let open_end = text.len() - rest.len();
                let end = if t.self_closing {
                    Some(open_end)
                } else {
                    matching_close(text, open_end, name)
                };
                match end {
                    Some(end) => {
                        found.push(Element {
                            start: at,
                            end,
                            name: t.name,
                            attributes: t.attributes,
                        });
                        pos = end;
                    }
                    None => pos = open_end,
                }
            }
            _ => pos = at + 1,
        }
    }
    found
}

/// Widens a range to whole lines when the element sits alone on them.
fn line_extent(text: &str, start: usize, end: usize) -> (usize, usize) {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    if !text[line_start..start].trim().is_empty() {
        return (start, end);
    }
    let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i + 1);
    if !text[end..line_end].trim().is_empty() {
        return (start, end);
    }
    (line_start, line_end)
}

/// Removes elements identified by tag name and `android:name`.
#[derive(Debug, Clone)]
pub struct RemoveElements {
    targets: Vec<(String, String)>,
}

impl RemoveElements {
    pub fn new<I, T, N>(targets: I) -> Self
    where
        I: IntoIterator<Item = (T, N)>,
        T: Into<String>,
        N: Into<String>,
    {
        RemoveElements {
            targets: targets
                .into_iter()
                .map(|(t, n)| (t.into(), n.into()))
                .collect(),
        }
    }
}

impl ContentRule for RemoveElements {
    fn describe(&self) -> String {
        let names: Vec<&str> = self.targets.iter().map(|(_, n)| n.as_str()).collect();
        format!("remove {}", names.join(", "))
    }

    fn apply(&self, content: &str) -> PatchResult<Rewrite> {
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for (tag_name, class_name) in &self.targets {
            for e in find_elements(content, tag_name) {
                if e.attribute("android:name") == Some(class_name.as_str()) {
                    spans.push(line_extent(content, e.start, e.end));
                }
            }
        }
        if spans.is_empty() {
            return Ok(Rewrite::untouched(content, 0));
        }

        spans.sort();
        spans.dedup();
        let mut out = String::with_capacity(content.len());
        let mut pos = 0;
        let mut removed = 0;
        for (start, end) in spans {
            if start < pos {
                // nested inside an element already removed
                continue;
            }
            out.push_str(&content[pos..start]);
            pos = end;
            removed += 1;
        }
        out.push_str(&content[pos..]);

        Ok(Rewrite {
            content: out,
            matched: removed,
            changed: removed,
        })
    }
}

/// Replaces elements whose attribute matches a pattern with a fixed element.
#[derive(Debug, Clone)]
pub struct ReplaceElements {
    tag: String,
    attribute: String,
    pattern: Regex,
    replacement: String,
}

impl ReplaceElements {
    pub fn new(
        tag: impl Into<String>,
        attribute: impl Into<String>,
        pattern: Regex,
        replacement: impl Into<String>,
    ) -> Self {
        ReplaceElements {
            tag: tag.into(),
            attribute: attribute.into(),
            pattern,
            replacement: replacement.into(),
        }
    }
}

impl ContentRule for ReplaceElements {
    fn describe(&self) -> String {
        format!("replace <{} {}=\"{}\">", self.tag, self.attribute, self.pattern)
    }

    fn apply(&self, content: &str) -> PatchResult<Rewrite> {
        let matches: Vec<Element> = find_elements(content, &self.tag)
            .into_iter()
            .filter(|e| {
                e.attribute(&self.attribute)
                    .map_or(false, |v| self.pattern.is_match(v))
            })
            .collect();

        let mut out = String::with_capacity(content.len());
        let mut pos = 0;
        let mut changed = 0;
        for e in &matches {
            out.push_str(&content[pos..e.start]);
            if &content[e.start..e.end] != self.replacement {
                changed += 1;
            }
            out.push_str(&self.replacement);
            pos = e.end;
        }
        if changed == 0 {
            return Ok(Rewrite::untouched(content, matches.len()));
        }
        out.push_str(&content[pos..]);

        Ok(Rewrite {
            content: out,
            matched: matches.len(),
            changed,
        })
    }
}
