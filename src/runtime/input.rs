//! Parsers for console tokens and runtime string conversions.

use crate::language::types::{Discrete, Scalar, Type};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::Value;
use nom::{
    IResult, Parser as NomParser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{anychar, char, digit1},
    combinator::{all_consuming, map_res, opt, recognize, value},
    number::complete::double,
    sequence::{delimited, pair},
};

pub fn parse_int(input: &str) -> IResult<&str, i64> {
    map_res(
        recognize(pair(opt(alt((char('-'), char('+')))), digit1)),
        str::parse::<i64>,
    )
    .parse(input)
}

pub fn parse_real(input: &str) -> IResult<&str, f64> {
    double(input)
}

pub fn parse_bool(input: &str) -> IResult<&str, bool> {
    alt((value(true, tag("true")), value(false, tag("false")))).parse(input)
}

/// A bare character or one wrapped in single quotes.
pub fn parse_char(input: &str) -> IResult<&str, char> {
    alt((delimited(char('\''), anychar, char('\'')), anychar)).parse(input)
}

fn whole<'a, T, P>(parser: P, token: &'a str) -> Option<T>
where
    P: NomParser<&'a str, T, nom::error::Error<&'a str>>,
{
    all_consuming(parser).parse(token).ok().map(|(_, parsed)| parsed)
}

/// Converts the whole of `token` into a value of the primitive `ty`.
pub fn convert(token: &str, ty: &Type) -> Option<Value> {
    match ty {
        Type::Discrete(Discrete::Int) => whole(parse_int, token).map(Value::Int),
        Type::Discrete(Discrete::Bool) => whole(parse_bool, token).map(Value::Bool),
        Type::Discrete(Discrete::Char) => whole(parse_char, token).map(Value::Char),
        Type::Scalar(Scalar::Real) => whole(parse_real, token).map(Value::Real),
        Type::Scalar(Scalar::String | Scalar::Text) => Some(Value::Str(token.to_string())),
        _ => None,
    }
}

pub fn read_value(token: &str, ty: &Type) -> RuntimeResult<Value> {
    convert(token, ty).ok_or_else(|| RuntimeError::InvalidInput {
        token: token.to_string(),
        expected: ty.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_signed_integers() {
        assert_eq!(parse_int("-42"), Ok(("", -42)));
        assert_eq!(parse_int("+7 rest"), Ok((" rest", 7)));
        assert!(parse_int("x1").is_err());
    }

    #[test]
    fn converts_whole_tokens_only() {
        assert!(matches!(convert("12", &Type::int()), Some(Value::Int(12))));
        assert!(convert("12a", &Type::int()).is_none());
        assert!(matches!(convert("2.5", &Type::real()), Some(Value::Real(v)) if v == 2.5));
        assert!(matches!(convert("true", &Type::bool()), Some(Value::Bool(true))));
        assert!(matches!(convert("'q'", &Type::char()), Some(Value::Char('q'))));
        assert!(matches!(convert("q", &Type::char()), Some(Value::Char('q'))));
        assert!(convert("qq", &Type::char()).is_none());
    }

    #[test]
    fn reports_rejected_tokens() {
        let err = read_value("abc", &Type::int()).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidInput {
                token: "abc".into(),
                expected: "Int".into(),
            }
        );
    }
}
