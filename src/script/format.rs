//! String formatting: f-string fields, `str.format` and `%` interpolation.
//!
//! Implements the subset of Python's format mini-language chart labels use:
//! fill/align, sign, zero padding, width, thousands separators, precision and
//! the `f e g d % s x b o` presentation types.

use super::error::ScriptError;
use super::value::{Value, format_number};

#[derive(Debug, Clone, Default, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Spec {
    fn parse(spec: &str) -> Result<Spec, ScriptError> {
        let invalid = || ScriptError::value(format!("Invalid format specifier '{}'", spec));
        let chars: Vec<char> = spec.chars().collect();
        let mut out = Spec::default();
        let mut i = 0;

        if chars.len() >= 2 && "<>^=".contains(chars[1]) {
            out.fill = Some(chars[0]);
            out.align = Some(chars[1]);
            i = 2;
        } else if chars.first().is_some_and(|c| "<>^=".contains(*c)) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if chars.get(i).is_some_and(|c| "+- ".contains(*c)) {
            out.sign = Some(chars[i]);
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > start {
            out.width = digits(&chars[start..i]).ok_or_else(invalid)?;
        }
        if chars.get(i).is_some_and(|c| *c == ',' || *c == '_') {
            out.grouping = Some(chars[i]);
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            if i == start {
                return Err(invalid());
            }
            out.precision = Some(digits(&chars[start..i]).ok_or_else(invalid)?.min(64));
        }
        if let Some(c) = chars.get(i) {
            if !"fFeEgGdn%sxXbo".contains(*c) {
                return Err(invalid());
            }
            out.kind = Some(*c);
            i += 1;
        }
        if i != chars.len() {
            return Err(invalid());
        }
        Ok(out)
    }
}

fn digits(chars: &[char]) -> Option<usize> {
    chars.iter().collect::<String>().parse::<usize>().ok().map(|n| n.min(10_000))
}

/// Format one value with a format-spec string (the part after `:`).
pub fn format_value(value: &Value, spec: &str) -> Result<String, ScriptError> {
    if spec.is_empty() {
        return Ok(value.py_str());
    }
    let spec = Spec::parse(spec)?;

    let (body, numeric) = match value {
        Value::Num(_) | Value::Bool(_) if spec.kind != Some('s') => {
            let n = value.as_f64().unwrap_or_default();
            (format_float(n, &spec)?, true)
        }
        Value::Str(s) => {
            if spec.kind.is_some_and(|k| k != 's') {
                return Err(unknown_code(spec.kind, "str"));
            }
            let text = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            (text, false)
        }
        other => {
            if spec.kind.is_some_and(|k| k != 's') {
                return Err(unknown_code(spec.kind, other.type_name()));
            }
            (other.py_str(), false)
        }
    };

    Ok(pad(body, &spec, numeric))
}

fn unknown_code(kind: Option<char>, type_name: &str) -> ScriptError {
    ScriptError::value(format!(
        "Unknown format code '{}' for object of type '{}'",
        kind.unwrap_or(' '),
        type_name
    ))
}

fn format_float(n: f64, spec: &Spec) -> Result<String, ScriptError> {
    let negative = n.is_sign_negative() && n != 0.0;
    let magnitude = n.abs();

    let mut body = match spec.kind {
        Some('f' | 'F') => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
        Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
        Some('e') => exponent(magnitude, spec.precision.unwrap_or(6)),
        Some('E') => exponent(magnitude, spec.precision.unwrap_or(6)).to_uppercase(),
        Some('g' | 'G') => general(magnitude, spec.precision.unwrap_or(6)),
        Some('d' | 'n') => {
            if n.fract() != 0.0 {
                return Err(unknown_code(spec.kind, "float"));
            }
            format!("{}", magnitude as u64)
        }
        Some(radix @ ('x' | 'X' | 'b' | 'o')) => {
            if n.fract() != 0.0 {
                return Err(unknown_code(spec.kind, "float"));
            }
            let v = magnitude as u64;
            match radix {
                'x' => format!("{:x}", v),
                'X' => format!("{:X}", v),
                'b' => format!("{:b}", v),
                _ => format!("{:o}", v),
            }
        }
        Some(other) => return Err(unknown_code(Some(other), "float")),
        None => match spec.precision {
            Some(p) => general(magnitude, p.max(1)),
            None => format_number(magnitude),
        },
    };

    if let Some(sep) = spec.grouping {
        body = group_thousands(&body, sep);
    }

    let sign = if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    };
    Ok(format!("{}{}", sign, body))
}

/// `1.50e+03` style exponent notation.
fn exponent(n: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, n);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => raw,
    }
}

/// `g` presentation: fixed or exponent, whichever is shorter, zeros trimmed.
fn general(n: f64, precision: usize) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if !n.is_finite() {
        return format_number(n);
    }
    let precision = precision.max(1);
    let exp = n.log10().floor() as i32;
    if exp < -4 || exp >= precision as i32 {
        let text = exponent(n, precision - 1);
        match text.split_once('e') {
            Some((mantissa, rest)) => format!("{}e{}", trim_zeros(mantissa), rest),
            None => text,
        }
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn group_thousands(body: &str, sep: char) -> String {
    let split = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (int_part, rest) = body.split_at(split);
    let mut grouped = String::with_capacity(body.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(sep);
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}

fn pad(body: String, spec: &Spec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let missing = spec.width - len;

    if spec.zero && spec.align.is_none() && numeric {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (c.to_string(), &body[1..]),
            _ => (String::new(), body.as_str()),
        };
        return format!("{}{}{}", sign, "0".repeat(missing), digits);
    }

    let fill = spec.fill.unwrap_or(' ').to_string();
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    match align {
        '<' => format!("{}{}", body, fill.repeat(missing)),
        '^' => {
            let left = missing / 2;
            format!("{}{}{}", fill.repeat(left), body, fill.repeat(missing - left))
        }
        _ => format!("{}{}", fill.repeat(missing), body),
    }
}

/// `template % args`, old-style interpolation.
pub fn percent_format(template: &str, args: &[Value]) -> Result<String, ScriptError> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut next = 0usize;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if chars.get(i) == Some(&'%') {
            out.push('%');
            i += 1;
            continue;
        }

        let mut spec = String::new();
        while let Some(c) = chars.get(i).filter(|c| "-+ 0".contains(**c)) {
            match c {
                '-' => spec.insert(0, '<'),
                other => spec.push(*other),
            }
            i += 1;
        }
        while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit() || **c == '.') {
            spec.push(*c);
            i += 1;
        }
        let Some(conversion) = chars.get(i).copied() else {
            return Err(ScriptError::value("incomplete format"));
        };
        i += 1;

        let arg = args.get(next).ok_or_else(|| {
            ScriptError::type_error("not enough arguments for format string")
        })?;
        next += 1;

        let formatted = match conversion {
            's' => format_value(&Value::str(arg.py_str()), &spec)?,
            'r' => format_value(&Value::str(arg.repr()), &spec)?,
            'd' | 'i' | 'u' => {
                let n = arg.as_f64().ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "%d format: a real number is required, not {}",
                        arg.type_name()
                    ))
                })?;
                format_value(&Value::Num(n.trunc()), &format!("{}d", spec))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' => {
                let n = arg.as_f64().ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "must be real number, not {}",
                        arg.type_name()
                    ))
                })?;
                format_value(&Value::Num(n), &format!("{}{}", spec, conversion))?
            }
            other => {
                return Err(ScriptError::value(format!(
                    "unsupported format character '{}'",
                    other
                )));
            }
        };
        out.push_str(&formatted);
    }

    if next < args.len() {
        return Err(ScriptError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

/// `template.format(*args, **kwargs)`.
pub fn str_format(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<String, ScriptError> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut auto = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '{' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|p| i + p)
                    .ok_or_else(|| ScriptError::value("Single '{' encountered in format string"))?;
                let field: String = chars[i + 1..close].iter().collect();
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let name = name
                    .trim_end_matches("!r")
                    .trim_end_matches("!s")
                    .trim();

                let value = if name.is_empty() {
                    let v = args.get(auto);
                    auto += 1;
                    v
                } else if let Ok(idx) = name.parse::<usize>() {
                    args.get(idx)
                } else {
                    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
                };
                let value = value.ok_or_else(|| {
                    if name.is_empty() || name.parse::<usize>().is_ok() {
                        ScriptError::index("Replacement index out of range for positional args tuple")
                    } else {
                        ScriptError::key(format!("'{}'", name))
                    }
                })?;

                out.push_str(&format_value(value, spec)?);
                i = close + 1;
            }
            '}' => return Err(ScriptError::value("Single '}' encountered in format string")),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Num(n)
    }

    #[test]
    fn test_fixed_and_percent() {
        assert_eq!(format_value(&num(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&num(0.256), ".1%").unwrap(), "25.6%");
        assert_eq!(format_value(&num(-1.5), ".0f").unwrap(), "-2");
    }

    #[test]
    fn test_thousands_separator() {
        assert_eq!(format_value(&num(1234567.0), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&num(1234.5), ",.2f").unwrap(), "1,234.50");
        assert_eq!(format_value(&num(-1234.0), ",").unwrap(), "-1,234");
    }

    #[test]
    fn test_width_and_alignment() {
        assert_eq!(format_value(&num(42.0), "5d").unwrap(), "   42");
        assert_eq!(format_value(&Value::str("ab"), "^6").unwrap(), "  ab  ");
        assert_eq!(format_value(&Value::str("ab"), "*>4").unwrap(), "**ab");
        assert_eq!(format_value(&num(-7.0), "04d").unwrap(), "-007");
    }

    #[test]
    fn test_exponent_and_general() {
        assert_eq!(format_value(&num(1500.0), ".2e").unwrap(), "1.50e+03");
        assert_eq!(format_value(&num(0.0001234), "g").unwrap(), "0.0001234");
        assert_eq!(format_value(&num(123456789.0), "g").unwrap(), "1.23457e+08");
        assert_eq!(format_value(&num(2.5), "g").unwrap(), "2.5");
    }

    #[test]
    fn test_integer_codes_reject_fractions() {
        assert!(format_value(&num(2.5), "d").is_err());
        assert_eq!(format_value(&num(255.0), "x").unwrap(), "ff");
    }

    #[test]
    fn test_string_with_numeric_code() {
        let err = format_value(&Value::str("x"), ".2f").unwrap_err();
        assert!(err.message.contains("Unknown format code 'f'"));
    }

    #[test]
    fn test_invalid_spec() {
        assert!(format_value(&num(1.0), ".f").is_err());
        assert!(format_value(&num(1.0), "2q").is_err());
    }

    #[test]
    fn test_percent_format() {
        assert_eq!(percent_format("%1.1f%%", &[num(42.123)]).unwrap(), "42.1%");
        assert_eq!(percent_format("%s has %d", &[Value::str("a"), num(3.9)]).unwrap(), "a has 3");
        assert_eq!(percent_format("%5.2f|%-4s|", &[num(1.0), Value::str("x")]).unwrap(), " 1.00|x   |");
        assert!(percent_format("%d %d", &[num(1.0)]).is_err());
        assert!(percent_format("%d", &[num(1.0), num(2.0)]).is_err());
    }

    #[test]
    fn test_str_format() {
        let out = str_format(
            "{} sold {:,} units ({pct:.0%})",
            &[Value::str("Alice"), num(12000.0)],
            &[("pct".to_string(), num(0.25))],
        )
        .unwrap();
        assert_eq!(out, "Alice sold 12,000 units (25%)");
        assert_eq!(str_format("{1}-{0} {{}}", &[num(1.0), num(2.0)], &[]).unwrap(), "2-1 {}");
        assert!(str_format("{}", &[], &[]).is_err());
    }
}
