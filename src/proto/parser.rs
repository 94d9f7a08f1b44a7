//! Permissive single-file proto parser
//!
//! A nom front-end producing a low-level per-file syntax record. It only
//! understands the declarations the schema model needs (package, imports,
//! file options, messages, services with their rpc options); everything
//! else (enums, extensions, reserved ranges, unknown statements) is
//! skipped by consuming a balanced block or through the next `;`. Real
//! schema trees are full of partially written or forward-declared files,
//! so erroring on unknown syntax is not an option.

use nom::{
    bytes::complete::take_while1,
    character::complete::char as pchar,
    combinator::{opt, recognize},
    error::{Error as NomError, ErrorKind},
    multi::many0_count,
    sequence::{pair, preceded},
    IResult,
};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SchemascanError};

// =============================================================================
// RAW SYNTAX RECORDS
// =============================================================================

/// Low-level record of a single parsed proto file
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawFile {
    /// Declared package name, empty when the file has none
    pub package: String,
    /// Imported proto file names
    pub imports: Vec<String>,
    /// File-level options as (name, constant-text) pairs
    pub options: Vec<(String, String)>,
    /// Top-level message declarations (nested ones hang off their parent)
    pub messages: Vec<RawMessage>,
    /// Service declarations
    pub services: Vec<RawService>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawMessage {
    pub name: String,
    /// Top-level fields only; fields of nested messages or inside oneofs
    /// count toward their own scope, not this one
    pub fields: Vec<RawField>,
    pub nested: Vec<RawMessage>,
}

impl RawMessage {
    /// Count of top-level fields (normal, map and oneof alike)
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Highest ordinal among ordinary declared fields
    pub fn highest_field_number(&self) -> i64 {
        self.fields
            .iter()
            .filter_map(|f| match f {
                RawField::Normal { number } => Some(*number),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawField {
    Normal { number: i64 },
    Map { number: i64 },
    OneOf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawService {
    pub name: String,
    pub rpcs: Vec<RawRpc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawRpc {
    pub name: String,
    pub request_type: String,
    pub returns_type: String,
    pub options: Vec<RawOption>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawOption {
    /// Option name with any custom-option parentheses stripped
    pub name: String,
    pub value: RawLiteral,
}

/// An option constant: either a bare value or an aggregate of key/value
/// entries (entries keep declaration order; duplicate keys are kept)
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawLiteral {
    pub source: String,
    pub entries: Vec<(String, RawLiteral)>,
}

impl RawLiteral {
    pub fn get(&self, key: &str) -> Option<&RawLiteral> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

// =============================================================================
// PACKAGE GROUPING
// =============================================================================

#[derive(Debug, Clone, Default)]
pub(crate) struct RawParsedFile {
    pub path: PathBuf,
    pub file: RawFile,
}

/// Files of one declared package name, grouped during the directory walk
#[derive(Debug, Clone, Default)]
pub(crate) struct RawPackage {
    pub name: String,
    /// Directory of the first file encountered for this package name.
    /// Files from other directories may still merge in by name.
    pub dir: PathBuf,
    pub files: Vec<RawParsedFile>,
}

/// Accumulates parsed files into per-package groups
#[derive(Debug, Default)]
pub(crate) struct Parser {
    pub packages: Vec<RawPackage>,
}

impl Parser {
    /// Parse one proto file from disk and fold it into its package group
    pub fn parse_path(&mut self, path: &Path) -> Result<()> {
        let src = fs::read_to_string(path)?;
        let file = parse_file_content(&src).map_err(|message| SchemascanError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        let pkg = match self.packages.iter_mut().find(|p| p.name == file.package) {
            Some(pkg) => pkg,
            None => {
                self.packages.push(RawPackage {
                    name: file.package.clone(),
                    dir: path.parent().unwrap_or(Path::new("")).to_path_buf(),
                    files: Vec::new(),
                });
                self.packages.last_mut().unwrap()
            }
        };

        pkg.files.push(RawParsedFile {
            path: path.to_path_buf(),
            file,
        });

        Ok(())
    }
}

// =============================================================================
// FILE GRAMMAR
// =============================================================================

/// Parse the full text of a proto file into a raw record
pub(crate) fn parse_file_content(src: &str) -> std::result::Result<RawFile, String> {
    let mut raw = RawFile::default();
    let mut input = src;

    loop {
        input = skip_trivia(input);
        if input.is_empty() {
            break;
        }

        if let Ok((rest, name)) = preceded(keyword("package"), lexeme(full_ident))(input) {
            raw.package = name.to_string();
            input = expect_semi(rest);
        } else if let Ok((rest, path)) = p_import(input) {
            raw.imports.push(path);
            input = expect_semi(rest);
        } else if let Ok((rest, (name, value))) = p_file_option(input) {
            raw.options.push((name, value));
            input = expect_semi(rest);
        } else if let Ok((rest, msg)) = preceded(keyword("message"), p_message)(input) {
            raw.messages.push(msg);
            input = skip_trivia(rest);
        } else if let Ok((rest, svc)) = preceded(keyword("service"), p_service)(input) {
            raw.services.push(svc);
            input = skip_trivia(rest);
        } else {
            // syntax/edition declarations, enums, extensions, stray tokens
            input = skip_statement(input)?;
        }
    }

    Ok(raw)
}

fn p_import(input: &str) -> IResult<&str, String> {
    let (input, _) = keyword("import")(input)?;
    let (input, _) = opt(lexeme(keyword("public")))(input)?;
    let (input, _) = opt(lexeme(keyword("weak")))(input)?;
    lexeme(string_lit)(input)
}

/// `option name = constant;` at file level; only the constant's text is kept
fn p_file_option(input: &str) -> IResult<&str, (String, String)> {
    let (input, _) = keyword("option")(input)?;
    let (input, name) = lexeme(option_name)(input)?;
    let (input, _) = lexeme(pchar('='))(input)?;
    let (input, value) = lexeme(constant_text)(input)?;
    Ok((input, (name.to_string(), value)))
}

fn p_message(input: &str) -> IResult<&str, RawMessage> {
    let (input, name) = lexeme(ident)(input)?;
    let (mut input, _) = lexeme(pchar('{'))(input)?;

    let mut msg = RawMessage {
        name: name.to_string(),
        ..Default::default()
    };

    loop {
        input = skip_trivia(input);
        if let Some(rest) = input.strip_prefix('}') {
            return Ok((rest, msg));
        }
        if input.is_empty() {
            return Err(unbalanced(input));
        }

        if let Ok((rest, nested)) = preceded(keyword("message"), p_message)(input) {
            msg.nested.push(nested);
            input = rest;
        } else if let Ok((rest, _)) = p_oneof(input) {
            msg.fields.push(RawField::OneOf);
            input = rest;
        } else if let Ok((rest, number)) = p_map_field(input) {
            msg.fields.push(RawField::Map { number });
            input = rest;
        } else if let Ok((rest, number)) = p_normal_field(input) {
            msg.fields.push(RawField::Normal { number });
            input = rest;
        } else {
            // enum, reserved, extensions, option, group...
            input = match skip_statement(input) {
                Ok(rest) => rest,
                Err(_) => return Err(unbalanced(input)),
            };
        }
    }
}

/// `oneof name { ... }` counts as a single top-level field; its members do not
fn p_oneof(input: &str) -> IResult<&str, ()> {
    let (input, _) = keyword("oneof")(input)?;
    let (input, _) = lexeme(ident)(input)?;
    let input = skip_trivia(input);
    let input = skip_block(input)?;
    Ok((input, ()))
}

/// `map<key, Value> name = N [...];`
fn p_map_field(input: &str) -> IResult<&str, i64> {
    let (input, _) = keyword("map")(input)?;
    let (input, _) = lexeme(pchar('<'))(input)?;
    let (input, _) = lexeme(full_ident)(input)?;
    let (input, _) = lexeme(pchar(','))(input)?;
    let (input, _) = lexeme(full_ident)(input)?;
    let (input, _) = lexeme(pchar('>'))(input)?;
    field_tail(input)
}

/// `[repeated|optional|required] Type name = N [...];`
fn p_normal_field(input: &str) -> IResult<&str, i64> {
    let (input, _) = opt(lexeme(keyword("repeated")))(input)?;
    let (input, _) = opt(lexeme(keyword("optional")))(input)?;
    let (input, _) = opt(lexeme(keyword("required")))(input)?;
    let (input, _) = lexeme(type_name)(input)?;
    field_tail(input)
}

/// Shared `name = N [options];` suffix of field declarations
fn field_tail(input: &str) -> IResult<&str, i64> {
    let (input, _) = lexeme(ident)(input)?;
    let (input, _) = lexeme(pchar('='))(input)?;
    let (input, number) = lexeme(integer)(input)?;
    let input = skip_trivia(input);
    let input = if input.starts_with('[') {
        skip_brackets(input)?
    } else {
        input
    };
    let input = skip_trivia(input);
    match input.strip_prefix(';') {
        Some(rest) => Ok((rest, number)),
        None => Err(nom_err(input, ErrorKind::Char)),
    }
}

fn p_service(input: &str) -> IResult<&str, RawService> {
    let (input, name) = lexeme(ident)(input)?;
    let (mut input, _) = lexeme(pchar('{'))(input)?;

    let mut svc = RawService {
        name: name.to_string(),
        ..Default::default()
    };

    loop {
        input = skip_trivia(input);
        if let Some(rest) = input.strip_prefix('}') {
            return Ok((rest, svc));
        }
        if input.is_empty() {
            return Err(unbalanced(input));
        }

        if let Ok((rest, rpc)) = preceded(keyword("rpc"), p_rpc)(input) {
            svc.rpcs.push(rpc);
            input = rest;
        } else {
            input = match skip_statement(input) {
                Ok(rest) => rest,
                Err(_) => return Err(unbalanced(input)),
            };
        }
    }
}

/// `rpc Name (Req) returns (Resp);` or `... { option*; }`
fn p_rpc(input: &str) -> IResult<&str, RawRpc> {
    let (input, name) = lexeme(ident)(input)?;
    let (input, request_type) = rpc_type(input)?;
    let (input, _) = lexeme(keyword("returns"))(input)?;
    let (input, returns_type) = rpc_type(input)?;

    let mut rpc = RawRpc {
        name: name.to_string(),
        request_type,
        returns_type,
        ..Default::default()
    };

    let input = skip_trivia(input);
    if let Some(rest) = input.strip_prefix(';') {
        return Ok((rest, rpc));
    }

    let (mut input, _) = lexeme(pchar('{'))(input)?;
    loop {
        input = skip_trivia(input);
        if let Some(rest) = input.strip_prefix('}') {
            return Ok((rest, rpc));
        }
        if input.is_empty() {
            return Err(unbalanced(input));
        }

        if let Ok((rest, option)) = p_rpc_option(input) {
            rpc.options.push(option);
            input = rest;
        } else {
            input = match skip_statement(input) {
                Ok(rest) => rest,
                Err(_) => return Err(unbalanced(input)),
            };
        }
    }
}

/// `(ReqType)` with an optional proto `stream` qualifier
fn rpc_type(input: &str) -> IResult<&str, String> {
    let (input, _) = lexeme(pchar('('))(input)?;
    let (input, _) = opt(lexeme(keyword("stream")))(input)?;
    let (input, name) = lexeme(type_name)(input)?;
    let (input, _) = lexeme(pchar(')'))(input)?;
    Ok((input, name.to_string()))
}

/// `option (google.api.http) = { ... };` and friends inside an rpc body
fn p_rpc_option(input: &str) -> IResult<&str, RawOption> {
    let (input, _) = keyword("option")(input)?;
    let (input, name) = lexeme(option_name)(input)?;
    let (input, _) = lexeme(pchar('='))(input)?;

    let input = skip_trivia(input);
    let (input, value) = if input.starts_with('{') {
        p_aggregate(input)?
    } else {
        let (rest, text) = constant_text(input)?;
        (
            rest,
            RawLiteral {
                source: text,
                ..Default::default()
            },
        )
    };

    let input = expect_semi(input);
    Ok((
        input,
        RawOption {
            name: name.to_string(),
            value,
        },
    ))
}

/// Text-format aggregate: `{ key: value key { ... } ... }`
fn p_aggregate(input: &str) -> IResult<&str, RawLiteral> {
    let (mut input, _) = lexeme(pchar('{'))(input)?;
    let mut lit = RawLiteral::default();

    loop {
        input = skip_trivia(input);
        if let Some(rest) = input.strip_prefix('}') {
            return Ok((rest, lit));
        }
        if input.is_empty() {
            return Err(unbalanced(input));
        }

        let (rest, key) = aggregate_key(input)?;
        let rest = skip_trivia(rest);

        let (rest, value) = if let Some(after_colon) = rest.strip_prefix(':') {
            let after_colon = skip_trivia(after_colon);
            if after_colon.starts_with('{') {
                p_aggregate(after_colon)?
            } else {
                let (r, text) = constant_text(after_colon)?;
                (
                    r,
                    RawLiteral {
                        source: text,
                        ..Default::default()
                    },
                )
            }
        } else if rest.starts_with('{') {
            // message-typed entries may omit the colon
            p_aggregate(rest)?
        } else {
            return Err(nom_err(rest, ErrorKind::Char));
        };

        lit.entries.push((key.to_string(), value));

        // entry separators are optional in text format
        input = skip_trivia(rest);
        if let Some(r) = input.strip_prefix(',').or_else(|| input.strip_prefix(';')) {
            input = r;
        }
    }
}

fn aggregate_key(input: &str) -> IResult<&str, &str> {
    // extension keys come bracketed: `[fully.qualified.name]`
    if let Some(rest) = input.strip_prefix('[') {
        let (rest, name) = lexeme(full_ident)(rest)?;
        let (rest, _) = lexeme(pchar(']'))(rest)?;
        return Ok((rest, name));
    }
    ident(input)
}

// =============================================================================
// LEXICAL HELPERS
// =============================================================================

fn nom_err(input: &str, kind: ErrorKind) -> nom::Err<NomError<&str>> {
    nom::Err::Error(NomError::new(input, kind))
}

fn unbalanced(input: &str) -> nom::Err<NomError<&str>> {
    nom::Err::Error(NomError::new(input, ErrorKind::TakeUntil))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Consume whitespace plus `//` and `/* */` comments
fn skip_trivia(input: &str) -> &str {
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("//") {
            rest = match after.find('\n') {
                Some(i) => &after[i + 1..],
                None => "",
            };
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(i) => &after[i + 2..],
                None => "",
            };
        } else {
            return trimmed;
        }
    }
}

/// Run a parser after consuming leading trivia
fn lexeme<'a, O, F>(mut inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input| inner(skip_trivia(input))
}

/// Match a bare keyword, refusing identifiers that merely share the prefix
fn keyword(kw: &'static str) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input| {
        let stripped = input
            .strip_prefix(kw)
            .ok_or_else(|| nom_err(input, ErrorKind::Tag))?;
        if stripped.chars().next().is_some_and(is_ident_char) {
            return Err(nom_err(input, ErrorKind::Tag));
        }
        Ok((stripped, kw))
    }
}

fn ident(input: &str) -> IResult<&str, &str> {
    let (rest, name) = take_while1(is_ident_char)(input)?;
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(nom_err(input, ErrorKind::Alpha));
    }
    Ok((rest, name))
}

/// `ident(.ident)*`
fn full_ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(ident, many0_count(pair(pchar('.'), ident))))(input)
}

/// A message/field type reference; may be fully qualified with a leading dot
fn type_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(pchar('.')), full_ident))(input)
}

/// A custom option name: `(fully.qualified)` with an optional `.field` suffix,
/// or a plain identifier chain. Parentheses are stripped from the result.
fn option_name(input: &str) -> IResult<&str, &str> {
    if let Some(rest) = input.strip_prefix('(') {
        let (rest, name) = lexeme(full_ident)(rest)?;
        let (rest, _) = lexeme(pchar(')'))(rest)?;
        let (rest, _) = opt(pair(pchar('.'), full_ident))(rest)?;
        return Ok((rest, name));
    }
    full_ident(input)
}

/// A double-quoted string with minimal escape handling
fn string_lit(input: &str) -> IResult<&str, String> {
    let rest = input
        .strip_prefix('"')
        .ok_or_else(|| nom_err(input, ErrorKind::Char))?;

    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&rest[i + 1..], out)),
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            _ => out.push(c),
        }
    }
    Err(nom_err(input, ErrorKind::Char))
}

fn integer(input: &str) -> IResult<&str, i64> {
    let (rest, text) = recognize(pair(opt(pchar('-')), take_while1(|c: char| c.is_ascii_digit())))(
        input,
    )?;
    let value = text.parse().map_err(|_| nom_err(input, ErrorKind::Digit))?;
    Ok((rest, value))
}

/// Any scalar option constant, rendered as text; strings are unquoted
fn constant_text(input: &str) -> IResult<&str, String> {
    if input.starts_with('"') {
        return string_lit(input);
    }
    let (rest, text) = take_while1(|c: char| {
        is_ident_char(c) || c == '.' || c == '-' || c == '+'
    })(input)?;
    Ok((rest, text.to_string()))
}

/// Consume an optional trailing `;` after a statement
fn expect_semi(input: &str) -> &str {
    let input = skip_trivia(input);
    input.strip_prefix(';').unwrap_or(input)
}

/// Skip one unknown statement: through the next `;`, or over a balanced
/// block (plus an optional trailing `;`) when a `{` comes first
fn skip_statement(input: &str) -> std::result::Result<&str, String> {
    let mut rest = input;
    loop {
        rest = skip_trivia(rest);
        match rest.chars().next() {
            None => return Err("unexpected end of file".to_string()),
            Some(';') => return Ok(&rest[1..]),
            Some('{') => {
                let after = skip_block(rest).map_err(|_| "unbalanced block".to_string())?;
                return Ok(expect_semi(after));
            }
            Some('"') => {
                let (r, _) = string_lit(rest).map_err(|_| "unterminated string".to_string())?;
                rest = r;
            }
            Some(c) => rest = &rest[c.len_utf8()..],
        }
    }
}

/// Skip a balanced `{ ... }` block, string- and comment-aware
fn skip_block(input: &str) -> std::result::Result<&str, nom::Err<NomError<&str>>> {
    let mut rest = input
        .strip_prefix('{')
        .ok_or_else(|| nom_err(input, ErrorKind::Char))?;
    let mut depth = 1usize;

    loop {
        rest = skip_trivia(rest);
        match rest.chars().next() {
            None => return Err(unbalanced(rest)),
            Some('{') => {
                depth += 1;
                rest = &rest[1..];
            }
            Some('}') => {
                depth -= 1;
                rest = &rest[1..];
                if depth == 0 {
                    return Ok(rest);
                }
            }
            Some('"') => {
                let (r, _) = string_lit(rest)?;
                rest = r;
            }
            Some(c) => rest = &rest[c.len_utf8()..],
        }
    }
}

/// Skip a balanced `[ ... ]` field-option list
fn skip_brackets(input: &str) -> std::result::Result<&str, nom::Err<NomError<&str>>> {
    let mut rest = input
        .strip_prefix('[')
        .ok_or_else(|| nom_err(input, ErrorKind::Char))?;
    let mut depth = 1usize;

    loop {
        rest = skip_trivia(rest);
        match rest.chars().next() {
            None => return Err(unbalanced(rest)),
            Some('[') => {
                depth += 1;
                rest = &rest[1..];
            }
            Some(']') => {
                depth -= 1;
                rest = &rest[1..];
                if depth == 0 {
                    return Ok(rest);
                }
            }
            Some('"') => {
                let (r, _) = string_lit(rest)?;
                rest = r;
            }
            Some(c) => rest = &rest[c.len_utf8()..],
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
