//! nom grammar for the snippet dialect.
//!
//! Expressions are parsed one logical line at a time; block structure is
//! rebuilt from the indentation recorded by [`layout`](super::layout).

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit0, digit1, multispace0, one_of, satisfy};
use nom::combinator::{map, not, opt, recognize, value};
use nom::error::{ErrorKind, ParseError, VerboseError};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};

use super::ast::{BinOp, CmpOp, Expr, FStringPart, Program, Stmt, StmtKind, Subscript, Target, UnaryOp};
use super::error::{ScriptError, ScriptErrorKind};
use super::layout::{self, LogicalLine, leading_word};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Deepest block nesting accepted.
pub const MAX_BLOCK_DEPTH: usize = 32;

const RESERVED: &[&str] = &[
    "True", "False", "None", "and", "or", "not", "in", "is", "if", "else", "elif", "for",
    "while", "def", "class", "return", "lambda", "import", "from", "pass", "break",
    "continue", "with", "try", "except", "finally", "global", "nonlocal", "del", "raise",
    "assert", "yield", "async", "await", "as",
];

const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "def", "class", "return", "lambda", "with", "try", "except", "finally", "global",
    "nonlocal", "del", "raise", "assert", "yield", "async", "await",
];

/// Parse a whole snippet.
pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let lines = layout::logical_lines(source)?;
    let Some(first) = lines.first() else {
        return Ok(Vec::new());
    };
    if first.indent != 0 {
        return Err(indentation_error("unexpected indent").at_line(first.number));
    }

    let mut pos = 0;
    let program = parse_block(&lines, &mut pos, 0, 0)?;
    if let Some(line) = lines.get(pos) {
        return Err(
            indentation_error("unindent does not match any outer indentation level")
                .at_line(line.number),
        );
    }
    Ok(program)
}

/// Parse a single expression, requiring the whole input to be consumed.
pub fn parse_expression(text: &str) -> Result<Expr, ScriptError> {
    complete(expression, text)
}

fn indentation_error(message: &str) -> ScriptError {
    ScriptError::new(ScriptErrorKind::IndentationError, message)
}

fn parse_block(
    lines: &[LogicalLine],
    pos: &mut usize,
    indent: usize,
    depth: usize,
) -> Result<Vec<Stmt>, ScriptError> {
    if depth > MAX_BLOCK_DEPTH {
        let line = lines.get(*pos).map(|l| l.number).unwrap_or_default();
        return Err(ScriptError::limit("blocks are nested too deeply").at_line(line));
    }

    let mut body = Vec::new();
    while let Some(line) = lines.get(*pos) {
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(indentation_error("unexpected indent").at_line(line.number));
        }
        body.push(parse_statement(lines, pos, indent, depth)?);
    }
    Ok(body)
}

fn parse_statement(
    lines: &[LogicalLine],
    pos: &mut usize,
    indent: usize,
    depth: usize,
) -> Result<Stmt, ScriptError> {
    let line = &lines[*pos];
    *pos += 1;
    let number = line.number;

    let kind = match leading_word(&line.text) {
        "for" => {
            let (header, inline) = split_header(&line.text, number)?;
            let (target, iter) = complete(for_header, header).map_err(|e| e.at_line(number))?;
            let body = parse_suite(lines, pos, indent, depth, inline, number)?;
            StmtKind::For { target, iter, body }
        }
        "while" => {
            let (header, inline) = split_header(&line.text, number)?;
            let condition = complete(preceded(keyword("while"), expression), header)
                .map_err(|e| e.at_line(number))?;
            let body = parse_suite(lines, pos, indent, depth, inline, number)?;
            StmtKind::While { condition, body }
        }
        "if" => {
            let mut branches = Vec::new();
            let mut orelse = Vec::new();

            let (header, inline) = split_header(&line.text, number)?;
            let condition = complete(preceded(keyword("if"), expression), header)
                .map_err(|e| e.at_line(number))?;
            branches.push((condition, parse_suite(lines, pos, indent, depth, inline, number)?));

            while let Some(next) = lines.get(*pos) {
                if next.indent != indent {
                    break;
                }
                match leading_word(&next.text) {
                    "elif" => {
                        *pos += 1;
                        let (header, inline) = split_header(&next.text, next.number)?;
                        let condition = complete(preceded(keyword("elif"), expression), header)
                            .map_err(|e| e.at_line(next.number))?;
                        let body = parse_suite(lines, pos, indent, depth, inline, next.number)?;
                        branches.push((condition, body));
                    }
                    "else" => {
                        *pos += 1;
                        let (header, inline) = split_header(&next.text, next.number)?;
                        if header.trim() != "else" {
                            return Err(ScriptError::syntax("invalid syntax").at_line(next.number));
                        }
                        orelse = parse_suite(lines, pos, indent, depth, inline, next.number)?;
                        break;
                    }
                    _ => break,
                }
            }
            StmtKind::If { branches, orelse }
        }
        word @ ("elif" | "else") => {
            return Err(
                ScriptError::syntax(format!("'{}' without a matching 'if'", word)).at_line(number),
            );
        }
        _ => parse_simple(&line.text).map_err(|e| e.at_line(number))?,
    };

    Ok(Stmt { line: number, kind })
}

fn parse_suite(
    lines: &[LogicalLine],
    pos: &mut usize,
    indent: usize,
    depth: usize,
    inline: &str,
    number: usize,
) -> Result<Vec<Stmt>, ScriptError> {
    if !inline.is_empty() {
        let kind = parse_simple(inline).map_err(|e| e.at_line(number))?;
        return Ok(vec![Stmt { line: number, kind }]);
    }
    match lines.get(*pos) {
        Some(next) if next.indent > indent => parse_block(lines, pos, next.indent, depth + 1),
        _ => Err(indentation_error("expected an indented block").at_line(number)),
    }
}

/// Split a compound statement header at its block colon.
fn split_header(text: &str, number: usize) -> Result<(&str, &str), ScriptError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Ok((&text[..idx], text[idx + 1..].trim())),
            _ => {}
        }
    }
    Err(ScriptError::syntax("expected ':'").at_line(number))
}

fn parse_simple(text: &str) -> Result<StmtKind, ScriptError> {
    match leading_word(text) {
        "pass" if text == "pass" => return Ok(StmtKind::Pass),
        "break" if text == "break" => return Ok(StmtKind::Break),
        "continue" if text == "continue" => return Ok(StmtKind::Continue),
        "import" | "from" => {
            let module = text
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .trim_end_matches(',')
                .to_string();
            return Ok(StmtKind::Import(module));
        }
        word if UNSUPPORTED_STATEMENTS.contains(&word) => {
            return Err(ScriptError::syntax(format!(
                "'{}' is not supported in visualization snippets",
                word
            )));
        }
        word @ ("for" | "while" | "if" | "elif" | "else") => {
            return Err(ScriptError::syntax(format!(
                "'{}' cannot be used in a one-line body",
                word
            )));
        }
        _ => {}
    }

    if let Ok((rest, (name, op))) = pair(identifier, aug_op)(text) {
        let value = complete(exprlist, rest)?;
        return Ok(StmtKind::AugAssign(name, op, value));
    }

    let (rest, first) = exprlist(text).map_err(|e| nom_error(text, e))?;
    let (rest, mut values) =
        many0(preceded(assign_eq, exprlist))(rest).map_err(|e| nom_error(text, e))?;
    ensure_consumed(rest)?;

    match values.pop() {
        None => Ok(StmtKind::Expr(first)),
        Some(value) if values.is_empty() => Ok(StmtKind::Assign(to_target(first)?, value)),
        Some(_) => Err(ScriptError::syntax("chained assignment is not supported")),
    }
}

fn to_target(expr: Expr) -> Result<Target, ScriptError> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Tuple(items) | Expr::List(items) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Expr::Name(name) => names.push(name),
                    _ => return Err(ScriptError::syntax("cannot assign to expression")),
                }
            }
            Ok(Target::Tuple(names))
        }
        Expr::Subscript(object, sub) => match *sub {
            Subscript::Index(index) => Ok(Target::Item {
                object,
                index: Box::new(index),
            }),
            Subscript::Slice(..) => Err(ScriptError::syntax("cannot assign to a slice")),
        },
        Expr::Attr(..) => Err(ScriptError::syntax("cannot assign to attribute")),
        _ => Err(ScriptError::syntax("cannot assign to expression")),
    }
}

fn complete<'a, T, F>(mut parser: F, text: &'a str) -> Result<T, ScriptError>
where
    F: FnMut(&'a str) -> PResult<'a, T>,
{
    match parser(text) {
        Ok((rest, value)) => {
            ensure_consumed(rest)?;
            Ok(value)
        }
        Err(err) => Err(nom_error(text, err)),
    }
}

fn ensure_consumed(rest: &str) -> Result<(), ScriptError> {
    let rest = rest.trim();
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::syntax(format!("invalid syntax near '{}'", excerpt(rest))))
    }
}

fn nom_error(text: &str, err: nom::Err<VerboseError<&str>>) -> ScriptError {
    let at = match &err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.errors.first().map(|(input, _)| *input),
        nom::Err::Incomplete(_) => None,
    };
    match at.map(str::trim) {
        Some(rest) if !rest.is_empty() => {
            ScriptError::syntax(format!("invalid syntax near '{}'", excerpt(rest)))
        }
        _ if text.trim().is_empty() => ScriptError::syntax("invalid syntax"),
        _ => ScriptError::syntax("unexpected end of statement"),
    }
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(24).collect();
    if text.chars().count() > 24 {
        out.push_str("...");
    }
    out
}

fn fail<T>(input: &str) -> PResult<'_, T> {
    Err(nom::Err::Error(VerboseError::from_error_kind(input, ErrorKind::Verify)))
}

// ==================== Tokens ====================

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn sym<'a>(s: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(multispace0, tag(s))
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(multispace0, terminated(tag(kw), not(satisfy(is_ident_char))))
}

fn assign_eq(input: &str) -> PResult<'_, &str> {
    terminated(sym("="), not(char('=')))(input)
}

fn identifier(input: &str) -> PResult<'_, String> {
    let (rest, name) = preceded(
        multispace0,
        recognize(pair(satisfy(is_ident_start), take_while(is_ident_char))),
    )(input)?;
    if RESERVED.contains(&name) {
        return fail(input);
    }
    Ok((rest, name.to_string()))
}

fn aug_op(input: &str) -> PResult<'_, BinOp> {
    alt((
        value(BinOp::Pow, sym("**=")),
        value(BinOp::FloorDiv, sym("//=")),
        value(BinOp::Add, sym("+=")),
        value(BinOp::Sub, sym("-=")),
        value(BinOp::Mul, sym("*=")),
        value(BinOp::Div, sym("/=")),
        value(BinOp::Mod, sym("%=")),
    ))(input)
}

fn number(input: &str) -> PResult<'_, Expr> {
    let (rest, text) = preceded(
        multispace0,
        recognize(pair(
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        )),
    )(input)?;
    if rest.starts_with(is_ident_start) {
        return fail(input);
    }
    match text.parse::<f64>() {
        Ok(n) => Ok((rest, Expr::Num(n))),
        Err(_) => fail(input),
    }
}

fn string_literal(input: &str) -> PResult<'_, Expr> {
    let (start, _) = multispace0(input)?;
    let prefix_len = start
        .chars()
        .take(2)
        .take_while(|c| "rRfFbBuU".contains(*c))
        .count();
    let (prefix, rest) = start.split_at(prefix_len);

    let delim = if rest.starts_with("'''") {
        "'''"
    } else if rest.starts_with("\"\"\"") {
        "\"\"\""
    } else if rest.starts_with('\'') {
        "'"
    } else if rest.starts_with('"') {
        "\""
    } else {
        return fail(input);
    };
    let raw = prefix.contains(['r', 'R']);
    let formatted = prefix.contains(['f', 'F']);

    let body = &rest[delim.len()..];
    let mut content = String::new();
    let mut chars = body.char_indices();
    let mut end = None;
    while let Some((idx, ch)) = chars.next() {
        if body[idx..].starts_with(delim) {
            end = Some(idx);
            break;
        }
        if ch != '\\' {
            content.push(ch);
            continue;
        }
        let Some((_, next)) = chars.next() else {
            break;
        };
        if raw {
            content.push('\\');
            content.push(next);
            continue;
        }
        match next {
            'n' => content.push('\n'),
            't' => content.push('\t'),
            'r' => content.push('\r'),
            '0' => content.push('\0'),
            '\\' | '\'' | '"' => content.push(next),
            other => {
                content.push('\\');
                content.push(other);
            }
        }
    }

    let Some(end) = end else {
        return fail(input);
    };
    let rest = &body[end + delim.len()..];

    if formatted {
        match fstring_parts(&content) {
            Ok(parts) => Ok((rest, Expr::FString(parts))),
            Err(_) => Err(nom::Err::Failure(VerboseError::from_error_kind(
                input,
                ErrorKind::Verify,
            ))),
        }
    } else {
        Ok((rest, Expr::Str(content)))
    }
}

/// Split f-string content into literal text and `{expr:spec}` fields.
fn fstring_parts(content: &str) -> Result<Vec<FStringPart>, ScriptError> {
    let chars: Vec<char> = content.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' => {
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }

                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut colon = None;
                let mut j = i + 1;
                while j < chars.len() {
                    let c = chars[j];
                    if let Some(q) = quote {
                        if c == q {
                            quote = None;
                        }
                    } else {
                        match c {
                            '\'' | '"' => quote = Some(c),
                            '(' | '[' | '{' => depth += 1,
                            ')' | ']' => depth = depth.saturating_sub(1),
                            '}' if depth == 0 => break,
                            '}' => depth -= 1,
                            ':' if depth == 0 && colon.is_none() => colon = Some(j),
                            _ => {}
                        }
                    }
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(ScriptError::syntax("f-string: expecting '}'"));
                }

                let expr_end = colon.unwrap_or(j);
                let spec = colon.map(|c| chars[c + 1..j].iter().collect::<String>());
                let mut expr_text: String = chars[i + 1..expr_end].iter().collect();
                for conversion in ["!r", "!s", "!a"] {
                    if let Some(stripped) = expr_text.trim_end().strip_suffix(conversion) {
                        expr_text = stripped.to_string();
                        break;
                    }
                }
                if expr_text.trim().is_empty() {
                    return Err(ScriptError::syntax("f-string: empty expression not allowed"));
                }

                parts.push(FStringPart::Field {
                    expr: parse_expression(&expr_text)?,
                    spec,
                });
                i = j + 1;
            }
            '}' => return Err(ScriptError::syntax("f-string: single '}' is not allowed")),
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

// ==================== Expressions ====================

fn atom(input: &str) -> PResult<'_, Expr> {
    alt((
        number,
        string_literal,
        value(Expr::Bool(true), keyword("True")),
        value(Expr::Bool(false), keyword("False")),
        value(Expr::None, keyword("None")),
        map(identifier, Expr::Name),
        paren_display,
        list_display,
        dict_display,
    ))(input)
}

fn paren_display(input: &str) -> PResult<'_, Expr> {
    let (input, _) = sym("(")(input)?;
    if let Ok((rest, _)) = sym(")")(input) {
        return Ok((rest, Expr::Tuple(Vec::new())));
    }

    let (input, first) = expression(input)?;
    if let Ok((rest, (target, iter, condition))) = comp_for(input) {
        let (rest, _) = sym(")")(rest)?;
        return Ok((rest, list_comp(first, target, iter, condition)));
    }

    let (input, more) = many0(preceded(sym(","), expression))(input)?;
    let (input, trailing) = opt(sym(","))(input)?;
    let (input, _) = sym(")")(input)?;

    if more.is_empty() && trailing.is_none() {
        Ok((input, first))
    } else {
        let mut items = vec![first];
        items.extend(more);
        Ok((input, Expr::Tuple(items)))
    }
}

fn list_display(input: &str) -> PResult<'_, Expr> {
    let (input, _) = sym("[")(input)?;
    if let Ok((rest, _)) = sym("]")(input) {
        return Ok((rest, Expr::List(Vec::new())));
    }

    let (input, first) = expression(input)?;
    if let Ok((rest, (target, iter, condition))) = comp_for(input) {
        let (rest, _) = sym("]")(rest)?;
        return Ok((rest, list_comp(first, target, iter, condition)));
    }

    let (input, more) = many0(preceded(sym(","), expression))(input)?;
    let (input, _) = opt(sym(","))(input)?;
    let (input, _) = sym("]")(input)?;

    let mut items = vec![first];
    items.extend(more);
    Ok((input, Expr::List(items)))
}

fn dict_entry(input: &str) -> PResult<'_, (Expr, Expr)> {
    let (input, key) = expression(input)?;
    let (input, _) = sym(":")(input)?;
    let (input, value) = expression(input)?;
    Ok((input, (key, value)))
}

fn dict_display(input: &str) -> PResult<'_, Expr> {
    let (input, _) = sym("{")(input)?;
    if let Ok((rest, _)) = sym("}")(input) {
        return Ok((rest, Expr::Dict(Vec::new())));
    }
    let (input, entries) = separated_list1(sym(","), dict_entry)(input)?;
    let (input, _) = opt(sym(","))(input)?;
    let (input, _) = sym("}")(input)?;
    Ok((input, Expr::Dict(entries)))
}

fn list_comp(element: Expr, target: Target, iter: Expr, condition: Option<Expr>) -> Expr {
    Expr::ListComp {
        element: Box::new(element),
        target,
        iter: Box::new(iter),
        condition: condition.map(Box::new),
    }
}

/// `for target in iter [if condition]`
fn comp_for(input: &str) -> PResult<'_, (Target, Expr, Option<Expr>)> {
    let (input, _) = keyword("for")(input)?;
    let (input, target) = loop_target(input)?;
    let (input, _) = keyword("in")(input)?;
    let (input, iter) = or_test(input)?;
    let (input, condition) = opt(preceded(keyword("if"), or_test))(input)?;
    Ok((input, (target, iter, condition)))
}

fn loop_target(input: &str) -> PResult<'_, Target> {
    alt((delimited(sym("("), name_list, sym(")")), name_list))(input)
}

fn name_list(input: &str) -> PResult<'_, Target> {
    let (input, mut names) = separated_list1(sym(","), identifier)(input)?;
    let (input, trailing) = opt(terminated(sym(","), not(identifier)))(input)?;
    if names.len() == 1 && trailing.is_none() {
        Ok((input, Target::Name(names.remove(0))))
    } else {
        Ok((input, Target::Tuple(names)))
    }
}

fn for_header(input: &str) -> PResult<'_, (Target, Expr)> {
    let (input, _) = keyword("for")(input)?;
    let (input, target) = loop_target(input)?;
    let (input, _) = keyword("in")(input)?;
    let (input, iter) = exprlist(input)?;
    Ok((input, (target, iter)))
}

type CallArgs = (Vec<Expr>, Vec<(String, Expr)>);

fn call_args(input: &str) -> PResult<'_, CallArgs> {
    let (mut input, _) = sym("(")(input)?;
    let mut args = Vec::new();
    let mut kwargs: Vec<(String, Expr)> = Vec::new();

    loop {
        if let Ok((rest, _)) = sym(")")(input) {
            return Ok((rest, (args, kwargs)));
        }

        if let Ok((rest, name)) = terminated(identifier, assign_eq)(input) {
            let (rest, value) = expression(rest)?;
            kwargs.push((name, value));
            input = rest;
        } else {
            if !kwargs.is_empty() {
                return fail(input);
            }
            let (rest, value) = expression(input)?;
            if let Ok((rest, (target, iter, condition))) = comp_for(rest) {
                args.push(list_comp(value, target, iter, condition));
                input = rest;
            } else {
                args.push(value);
                input = rest;
            }
        }

        match sym(",")(input) {
            Ok((rest, _)) => input = rest,
            Err(_) => {
                let (rest, _) = sym(")")(input)?;
                return Ok((rest, (args, kwargs)));
            }
        }
    }
}

fn subscript(input: &str) -> PResult<'_, Subscript> {
    let (input, _) = sym("[")(input)?;
    let (input, lower) = opt(expression)(input)?;
    if let Ok((rest, _)) = sym(":")(input) {
        let (rest, upper) = opt(expression)(rest)?;
        let (rest, _) = sym("]")(rest)?;
        return Ok((rest, Subscript::Slice(lower, upper)));
    }
    let Some(index) = lower else {
        return fail(input);
    };
    let (input, _) = sym("]")(input)?;
    Ok((input, Subscript::Index(index)))
}

fn postfix(input: &str) -> PResult<'_, Expr> {
    let (mut input, mut expr) = atom(input)?;
    loop {
        if let Ok((rest, name)) = preceded(sym("."), identifier)(input) {
            expr = Expr::Attr(Box::new(expr), name);
            input = rest;
        } else if let Ok((rest, (args, kwargs))) = call_args(input) {
            expr = Expr::Call {
                func: Box::new(expr),
                args,
                kwargs,
            };
            input = rest;
        } else if let Ok((rest, sub)) = subscript(input) {
            expr = Expr::Subscript(Box::new(expr), Box::new(sub));
            input = rest;
        } else {
            return Ok((input, expr));
        }
    }
}

fn power(input: &str) -> PResult<'_, Expr> {
    let (input, base) = postfix(input)?;
    match preceded(sym("**"), unary)(input) {
        Ok((rest, exponent)) => Ok((
            rest,
            Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)),
        )),
        Err(nom::Err::Error(_)) => Ok((input, base)),
        Err(e) => Err(e),
    }
}

fn unary(input: &str) -> PResult<'_, Expr> {
    let sign = alt((
        value(UnaryOp::Neg, terminated(sym("-"), not(char('=')))),
        value(UnaryOp::Pos, terminated(sym("+"), not(char('=')))),
    ));
    alt((
        map(pair(sign, unary), |(op, operand)| match (op, operand) {
            (UnaryOp::Neg, Expr::Num(n)) => Expr::Num(-n),
            (op, operand) => Expr::Unary(op, Box::new(operand)),
        }),
        power,
    ))(input)
}

fn fold_binary(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| {
        Expr::Binary(op, Box::new(left), Box::new(right))
    })
}

fn term(input: &str) -> PResult<'_, Expr> {
    let op = alt((
        value(BinOp::FloorDiv, terminated(sym("//"), not(char('=')))),
        value(BinOp::Mul, terminated(sym("*"), not(one_of("*=")))),
        value(BinOp::Div, terminated(sym("/"), not(char('=')))),
        value(BinOp::Mod, terminated(sym("%"), not(char('=')))),
    ));
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(op, unary))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn arith(input: &str) -> PResult<'_, Expr> {
    let op = alt((
        value(BinOp::Add, terminated(sym("+"), not(char('=')))),
        value(BinOp::Sub, terminated(sym("-"), not(char('=')))),
    ));
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(op, term))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn comp_op(input: &str) -> PResult<'_, CmpOp> {
    alt((
        value(CmpOp::Eq, sym("==")),
        value(CmpOp::NotEq, sym("!=")),
        value(CmpOp::LtE, sym("<=")),
        value(CmpOp::GtE, sym(">=")),
        value(CmpOp::Lt, sym("<")),
        value(CmpOp::Gt, sym(">")),
        value(CmpOp::NotIn, pair(keyword("not"), keyword("in"))),
        value(CmpOp::In, keyword("in")),
        value(CmpOp::IsNot, pair(keyword("is"), keyword("not"))),
        value(CmpOp::Is, keyword("is")),
    ))(input)
}

fn comparison(input: &str) -> PResult<'_, Expr> {
    let (input, first) = arith(input)?;
    let (input, links) = many0(pair(comp_op, arith))(input)?;

    let mut left = first;
    let mut chain: Option<Expr> = None;
    for (op, right) in links {
        let link = Expr::Compare(op, Box::new(left), Box::new(right.clone()));
        chain = Some(match chain {
            None => link,
            Some(prev) => Expr::And(Box::new(prev), Box::new(link)),
        });
        left = right;
    }
    Ok((input, chain.unwrap_or(left)))
}

fn not_test(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(keyword("not"), not_test), |e| {
            Expr::Unary(UnaryOp::Not, Box::new(e))
        }),
        comparison,
    ))(input)
}

fn and_test(input: &str) -> PResult<'_, Expr> {
    let (input, first) = not_test(input)?;
    let (input, rest) = many0(preceded(keyword("and"), not_test))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |l, r| Expr::And(Box::new(l), Box::new(r))),
    ))
}

fn or_test(input: &str) -> PResult<'_, Expr> {
    let (input, first) = and_test(input)?;
    let (input, rest) = many0(preceded(keyword("or"), and_test))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |l, r| Expr::Or(Box::new(l), Box::new(r))),
    ))
}

fn expression(input: &str) -> PResult<'_, Expr> {
    let (input, then) = or_test(input)?;
    let mut ternary = tuple((keyword("if"), or_test, keyword("else"), expression));
    match ternary(input) {
        Ok((rest, (_, condition, _, otherwise))) => Ok((
            rest,
            Expr::IfElse {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        )),
        Err(nom::Err::Error(_)) => Ok((input, then)),
        Err(e) => Err(e),
    }
}

/// Comma-separated expressions; more than one (or a trailing comma) is a tuple.
fn exprlist(input: &str) -> PResult<'_, Expr> {
    let (input, first) = expression(input)?;
    let (input, more) = many0(preceded(sym(","), expression))(input)?;
    let (input, trailing) = opt(sym(","))(input)?;
    if more.is_empty() && trailing.is_none() {
        Ok((input, first))
    } else {
        let mut items = vec![first];
        items.extend(more);
        Ok((input, Expr::Tuple(items)))
    }
}
