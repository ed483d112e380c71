use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::{CommonError, CommonResult};
use crate::spec::data_type::{DataType, Field, Schema};
use crate::string::{quote_name_if_needed, quote_string_literal};

/// Renders the type in the form accepted by `CREATE TABLE` and `ALTER TABLE` statements,
/// e.g. `array<struct<id:bigint,tags:array<string>>>`.
impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "void"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Byte => write!(f, "tinyint"),
            DataType::Short => write!(f, "smallint"),
            DataType::Integer => write!(f, "int"),
            DataType::Long => write!(f, "bigint"),
            DataType::Float => write!(f, "float"),
            DataType::Double => write!(f, "double"),
            DataType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            DataType::String => write!(f, "string"),
            DataType::Binary => write!(f, "binary"),
            DataType::Date => write!(f, "date"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::TimestampNtz => write!(f, "timestamp_ntz"),
            DataType::Array { element_type, .. } => write!(f, "array<{element_type}>"),
            DataType::Map {
                key_type,
                value_type,
                ..
            } => write!(f, "map<{key_type},{value_type}>"),
            DataType::Struct { fields } => {
                write!(f, "struct<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(
                        f,
                        "{}:{}",
                        quote_name_if_needed(&field.name),
                        field.data_type
                    )?;
                    if !field.nullable {
                        write!(f, " NOT NULL")?;
                    }
                    if let Some(comment) = field.comment() {
                        write!(f, " COMMENT {}", quote_string_literal(comment))?;
                    }
                }
                write!(f, ">")
            }
        }
    }
}

impl FromStr for DataType {
    type Err = CommonError;

    fn from_str(s: &str) -> CommonResult<Self> {
        parse_data_type(s)
    }
}

/// Parses a type string such as `map<string,array<int>>`.
/// Keywords are case-insensitive and the usual Spark aliases are accepted.
pub fn parse_data_type(input: &str) -> CommonResult<DataType> {
    let mut parser = TypeParser::new(input);
    let data_type = parser.data_type()?;
    parser.finish()?;
    Ok(data_type)
}

/// Parses a column list such as `id bigint NOT NULL, name string COMMENT 'the name'`.
pub fn parse_schema(input: &str) -> CommonResult<Schema> {
    let mut parser = TypeParser::new(input);
    let mut fields = vec![];
    if !parser.is_at_end() {
        loop {
            fields.push(parser.field()?);
            if !parser.eat(',') {
                break;
            }
        }
    }
    parser.finish()?;
    Ok(Schema::new(fields))
}

struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> CommonError {
        CommonError::invalid_data_type(
            self.input,
            format!("{} at position {}", message.into(), self.pos),
        )
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    fn is_at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn finish(&mut self) -> CommonResult<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> CommonResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn word(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            None
        } else {
            self.pos += len;
            Some(&rest[..len])
        }
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        let start = self.pos;
        match self.word() {
            Some(w) if w.eq_ignore_ascii_case(keyword) => true,
            _ => {
                self.pos = start;
                false
            }
        }
    }

    fn identifier(&mut self) -> CommonResult<String> {
        if self.eat('`') {
            let mut name = String::new();
            let mut chars = self.rest().char_indices().peekable();
            while let Some((i, c)) = chars.next() {
                if c == '`' {
                    if matches!(chars.peek(), Some((_, '`'))) {
                        chars.next();
                        name.push('`');
                    } else {
                        self.pos += i + 1;
                        return Ok(name);
                    }
                } else {
                    name.push(c);
                }
            }
            Err(self.error("unterminated quoted identifier"))
        } else {
            self.word()
                .map(|w| w.to_string())
                .ok_or_else(|| self.error("expected an identifier"))
        }
    }

    fn string_literal(&mut self) -> CommonResult<String> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a string literal")),
        };
        self.pos += 1;
        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    self.pos += i + 1;
                    return Ok(value);
                }
                c => value.push(c),
            }
        }
        Err(self.error("unterminated string literal"))
    }

    fn integer<T: FromStr>(&mut self) -> CommonResult<T> {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let value = rest[..len]
            .parse()
            .map_err(|_| self.error("expected an integer"))?;
        self.pos += len;
        Ok(value)
    }

    fn data_type(&mut self) -> CommonResult<DataType> {
        let name = self
            .word()
            .ok_or_else(|| self.error("expected a data type"))?
            .to_lowercase();
        match name.as_str() {
            "array" => {
                self.expect('<')?;
                let element_type = self.data_type()?;
                self.expect('>')?;
                Ok(DataType::array(element_type))
            }
            "map" => {
                self.expect('<')?;
                let key_type = self.data_type()?;
                self.expect(',')?;
                let value_type = self.data_type()?;
                self.expect('>')?;
                Ok(DataType::map(key_type, value_type))
            }
            "struct" => {
                self.expect('<')?;
                let mut fields = vec![];
                if !self.eat('>') {
                    loop {
                        let name = self.identifier()?;
                        self.eat(':');
                        fields.push(self.field_options(name)?);
                        if !self.eat(',') {
                            break;
                        }
                    }
                    self.expect('>')?;
                }
                Ok(DataType::struct_of(fields))
            }
            "decimal" | "dec" | "numeric" => {
                if self.eat('(') {
                    let precision = self.integer()?;
                    let scale = if self.eat(',') { self.integer()? } else { 0 };
                    self.expect(')')?;
                    Ok(DataType::Decimal { precision, scale })
                } else {
                    // Same default as Spark
                    Ok(DataType::Decimal {
                        precision: 10,
                        scale: 0,
                    })
                }
            }
            "char" | "varchar" => {
                if self.eat('(') {
                    let _length: u32 = self.integer()?;
                    self.expect(')')?;
                }
                Ok(DataType::String)
            }
            "void" | "null" => Ok(DataType::Null),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "tinyint" | "byte" => Ok(DataType::Byte),
            "smallint" | "short" => Ok(DataType::Short),
            "int" | "integer" => Ok(DataType::Integer),
            "bigint" | "long" => Ok(DataType::Long),
            "float" | "real" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            "string" => Ok(DataType::String),
            "binary" => Ok(DataType::Binary),
            "date" => Ok(DataType::Date),
            "timestamp" | "timestamp_ltz" => Ok(DataType::Timestamp),
            "timestamp_ntz" => Ok(DataType::TimestampNtz),
            other => Err(self.error(format!("unknown data type '{other}'"))),
        }
    }

    /// Scans a default expression up to `COMMENT`, `,` or the end of the enclosing
    /// type, skipping over string literals and bracketed groups.
    fn default_expression(&mut self) -> CommonResult<String> {
        self.skip_whitespace();
        let rest = self.rest();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut end = rest.len();
        for (i, c) in rest.char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '<' => depth += 1,
                ')' | ']' | '>' if depth > 0 => depth -= 1,
                ',' | ')' | '>' if depth == 0 => {
                    end = i;
                    break;
                }
                _ if depth == 0 && starts_keyword(&rest[i..], "COMMENT") => {
                    let boundary = rest[..i]
                        .chars()
                        .next_back()
                        .map_or(true, |p| !(p.is_ascii_alphanumeric() || p == '_'));
                    if boundary {
                        end = i;
                        break;
                    }
                }
                _ => {}
            }
        }
        if quote.is_some() {
            return Err(self.error("unterminated string literal in default expression"));
        }
        let expression = rest[..end].trim_end();
        if expression.is_empty() {
            return Err(self.error("expected a default expression"));
        }
        self.pos += end;
        Ok(expression.to_string())
    }

    fn field(&mut self) -> CommonResult<Field> {
        let name = self.identifier()?;
        self.field_options(name)
    }

    fn field_options(&mut self, name: String) -> CommonResult<Field> {
        let data_type = self.data_type()?;
        let mut field = Field::new(name, data_type, true);
        if self.keyword("NOT") {
            if !self.keyword("NULL") {
                return Err(self.error("expected NULL after NOT"));
            }
            field.nullable = false;
        }
        if self.keyword("DEFAULT") {
            let expression = self.default_expression()?;
            field = field.with_default(expression);
        }
        if self.keyword("COMMENT") {
            let comment = self.string_literal()?;
            field = field.with_comment(comment);
        }
        Ok(field)
    }
}

fn starts_keyword(input: &str, keyword: &str) -> bool {
    input
        .get(..keyword.len())
        .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
        && !input[keyword.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}
