use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, one_of, space0, space1};
use nom::combinator::{map, verify};
use nom::error::{Error, ErrorKind};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;
use crate::types::{MethodDescriptor, MethodHeader, TypeDescriptor};

const METHOD_MODIFIERS: &[&str] = &[
    "public", "protected", "private", "static", "final", "abstract", "synthetic",
    "synchronized", "declared-synchronized", "native", "varargs", "strictfp", "strict",
    "bridge", "constructor",
];

fn parse_modifier(smali: &str) -> IResult<&str, &str>
{
    terminated(
        verify(
            take_while1(|c: char| c.is_ascii_lowercase() || c == '-'),
            |m: &str| METHOD_MODIFIERS.contains(&m),
        ),
        space1,
    )(smali)
}

pub(crate) fn parse_type_descriptor(smali: &str) -> IResult<&str, TypeDescriptor>
{
    alt((
        map(one_of("ZBCSIJFDV"), TypeDescriptor::Primitive),
        map(
            delimited(char('L'), take_while1(|c: char| c != ';' && c != '(' && c != ')'), char(';')),
            |class_name: &str| TypeDescriptor::Object(class_name.to_string()),
        ),
        map(preceded(char('['), parse_type_descriptor), |t| TypeDescriptor::Array(Box::new(t))),
    ))(smali)
}

pub(crate) fn parse_method_descriptor(smali: &str) -> IResult<&str, MethodDescriptor>
{
    let (input, (args, result)) = pair(
        delimited(char('('), many0(parse_type_descriptor), char(')')),
        parse_type_descriptor,
    )(smali)?;
    Ok((input, MethodDescriptor { args, result }))
}

/// Parses a `.method` declaration line, e.g.
/// `.method public static verifyIntegrity(Landroid/content/Context;)V`
///
/// Only trailing whitespace or a `#` comment may follow the descriptor.
pub(crate) fn parse_method_header(line: &str) -> IResult<&str, MethodHeader>
{
    let (input, _) = preceded(space0, tag(".method"))(line)?;
    let (input, _) = space1(input)?;
    let (input, modifiers) = many0(parse_modifier)(input)?;
    let (input, name) = take_while1(|c: char| c != '(' && !c.is_whitespace())(input)?;
    let (input, descriptor) = parse_method_descriptor(input)?;
    let (input, _) = space0(input)?;

    let trailing = input.trim_end();
    if !trailing.is_empty() && !trailing.starts_with('#')
    {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
    }

    let constructor = modifiers.contains(&"constructor");
    Ok((input, MethodHeader {
        modifiers: modifiers.into_iter().map(str::to_string).collect(),
        constructor,
        name: name.to_string(),
        descriptor,
    }))
}

/// True for any `.method` declaration line, matching or not
pub(crate) fn is_method_start(line: &str) -> bool
{
    let t = line.trim_start();
    t.strip_prefix(".method").map_or(false, |rest| rest.starts_with(|c: char| c.is_whitespace()))
}

pub(crate) fn is_method_end(line: &str) -> bool
{
    line.trim() == ".end method"
}
