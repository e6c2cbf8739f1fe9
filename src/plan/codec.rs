//! Tagged-tree object codec for plan serialization.
//!
//! The plan tree formats itself through the [`ObjectFormatter`] trait and
//! parses itself back through [`ObjectParser`]; each node writes its type
//! tag first so the parser can dispatch. [`TextObjectFormatter`] and
//! [`TextObjectParser`] are the concrete text implementations used by the
//! library; the traits keep the syntax pluggable.

use crate::error::{Result, SigilError};

/// Writer side of the tagged-tree codec.
pub trait ObjectFormatter {
    /// Emit a node type tag. Always the first write for a node.
    fn write_type_tag(&mut self, tag: &str);

    /// Begin an object body.
    fn open_object(&mut self);

    /// Begin a named field of the current object.
    fn open_object_field(&mut self, name: &str);

    /// End an object body.
    fn close_object(&mut self);

    /// Begin a list value.
    fn open_list(&mut self);

    /// Begin the next list item.
    fn open_list_item(&mut self);

    /// End a list value.
    fn close_list(&mut self);

    /// Begin a primitive value (written right after its type tag).
    fn open_primitive(&mut self);

    /// End a primitive value.
    fn close_primitive(&mut self);

    /// Emit an unsigned primitive argument.
    fn format_u32(&mut self, value: u32);

    /// Emit a boolean primitive argument.
    fn format_bool(&mut self, value: bool);

    /// Emit a null in place of an object.
    fn null_object(&mut self);
}

/// Reader side of the tagged-tree codec. Every method fails with
/// [`SigilError::MalformedPlan`] on unexpected input.
pub trait ObjectParser {
    /// Consume and return the next node type tag (`null` for a null
    /// object).
    fn read_type_tag(&mut self) -> Result<String>;

    /// Consume an object opener.
    fn open_object(&mut self) -> Result<()>;

    /// Consume the named field of the current object.
    fn open_object_field(&mut self, name: &str) -> Result<()>;

    /// Consume an object closer.
    fn close_object(&mut self) -> Result<()>;

    /// Consume a list opener.
    fn open_list(&mut self) -> Result<()>;

    /// Returns whether another list item follows, consuming the separator
    /// if so.
    fn open_list_item(&mut self) -> Result<bool>;

    /// Consume a list closer.
    fn close_list(&mut self) -> Result<()>;

    /// Consume a primitive opener.
    fn open_primitive(&mut self) -> Result<()>;

    /// Consume a primitive closer.
    fn close_primitive(&mut self) -> Result<()>;

    /// Consume an unsigned primitive argument.
    fn parse_u32(&mut self) -> Result<u32>;

    /// Consume a boolean primitive argument.
    fn parse_bool(&mut self) -> Result<bool>;
}

/// Text formatter producing an indented, human-readable rendering:
///
/// ```text
/// And {
///   Children: [
///     Row(0, 3, false),
///     Not {
///       Child: Report {
///         Child: null
///       }
///     }
///   ]
/// }
/// ```
#[derive(Debug, Default)]
pub struct TextObjectFormatter {
    output: String,
    indent: usize,
    list_first: Vec<bool>,
    primitive_first: bool,
}

impl TextObjectFormatter {
    /// Create an empty formatter.
    pub fn new() -> Self {
        TextObjectFormatter::default()
    }

    /// The formatted text.
    pub fn into_string(self) -> String {
        self.output
    }

    fn newline(&mut self) {
        self.output.push('\n');
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
    }
}

impl ObjectFormatter for TextObjectFormatter {
    fn write_type_tag(&mut self, tag: &str) {
        self.output.push_str(tag);
    }

    fn open_object(&mut self) {
        self.output.push_str(" {");
        self.indent += 1;
    }

    fn open_object_field(&mut self, name: &str) {
        self.newline();
        self.output.push_str(name);
        self.output.push_str(": ");
    }

    fn close_object(&mut self) {
        self.indent -= 1;
        self.newline();
        self.output.push('}');
    }

    fn open_list(&mut self) {
        self.output.push('[');
        self.indent += 1;
        self.list_first.push(true);
    }

    fn open_list_item(&mut self) {
        if let Some(first) = self.list_first.last_mut() {
            if !*first {
                self.output.push(',');
            }
            *first = false;
        }
        self.newline();
    }

    fn close_list(&mut self) {
        self.indent -= 1;
        self.list_first.pop();
        self.newline();
        self.output.push(']');
    }

    fn open_primitive(&mut self) {
        self.output.push('(');
        self.primitive_first = true;
    }

    fn close_primitive(&mut self) {
        self.output.push(')');
    }

    fn format_u32(&mut self, value: u32) {
        if !self.primitive_first {
            self.output.push_str(", ");
        }
        self.primitive_first = false;
        self.output.push_str(&value.to_string());
    }

    fn format_bool(&mut self, value: bool) {
        if !self.primitive_first {
            self.output.push_str(", ");
        }
        self.primitive_first = false;
        self.output.push_str(if value { "true" } else { "false" });
    }

    fn null_object(&mut self) {
        self.output.push_str("null");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u64),
    Punct(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Number(value) => format!("number {value}"),
            Token::Punct(c) => format!("'{c}'"),
        }
    }
}

/// Text parser for the [`TextObjectFormatter`] rendering. Whitespace is
/// insignificant.
#[derive(Debug)]
pub struct TextObjectParser {
    tokens: Vec<Token>,
    position: usize,
}

impl TextObjectParser {
    /// Tokenize `text`. Unknown characters surface later as parse errors.
    pub fn new(text: &str) -> Result<Self> {
        let mut tokens = Vec::new();
        let mut chars = text.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else if c.is_ascii_alphabetic() {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            } else if c.is_ascii_digit() {
                let mut value: u64 = 0;
                while let Some(&c) = chars.peek() {
                    if let Some(digit) = c.to_digit(10) {
                        value = value
                            .checked_mul(10)
                            .and_then(|v| v.checked_add(u64::from(digit)))
                            .ok_or_else(|| SigilError::malformed("numeric overflow"))?;
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(value));
            } else if "{}[](),:".contains(c) {
                tokens.push(Token::Punct(c));
                chars.next();
            } else {
                return Err(SigilError::malformed(format!(
                    "unexpected character '{c}'"
                )));
            }
        }

        Ok(TextObjectParser {
            tokens,
            position: 0,
        })
    }

    /// Error unless all input has been consumed.
    pub fn expect_end(&self) -> Result<()> {
        match self.tokens.get(self.position) {
            None => Ok(()),
            Some(token) => Err(SigilError::malformed(format!(
                "trailing {} after plan",
                token.describe()
            ))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| SigilError::malformed("unexpected end of plan"))?;
        self.position += 1;
        Ok(token)
    }

    fn expect_punct(&mut self, expected: char) -> Result<()> {
        let token = self.next()?;
        if token != Token::Punct(expected) {
            return Err(SigilError::malformed(format!(
                "expected '{expected}', found {}",
                token.describe()
            )));
        }
        Ok(())
    }

    fn skip_comma(&mut self) {
        if self.peek() == Some(&Token::Punct(',')) {
            self.position += 1;
        }
    }
}

impl ObjectParser for TextObjectParser {
    fn read_type_tag(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(tag) => Ok(tag),
            token => Err(SigilError::malformed(format!(
                "expected a node type tag, found {}",
                token.describe()
            ))),
        }
    }

    fn open_object(&mut self) -> Result<()> {
        self.expect_punct('{')
    }

    fn open_object_field(&mut self, name: &str) -> Result<()> {
        match self.next()? {
            Token::Ident(found) if found == name => {}
            token => {
                return Err(SigilError::malformed(format!(
                    "expected field '{name}', found {}",
                    token.describe()
                )));
            }
        }
        self.expect_punct(':')
    }

    fn close_object(&mut self) -> Result<()> {
        self.expect_punct('}')
    }

    fn open_list(&mut self) -> Result<()> {
        self.expect_punct('[')
    }

    fn open_list_item(&mut self) -> Result<bool> {
        match self.peek() {
            Some(Token::Punct(']')) | None => Ok(false),
            Some(Token::Punct(',')) => {
                self.position += 1;
                Ok(true)
            }
            Some(_) => Ok(true),
        }
    }

    fn close_list(&mut self) -> Result<()> {
        self.expect_punct(']')
    }

    fn open_primitive(&mut self) -> Result<()> {
        self.expect_punct('(')
    }

    fn close_primitive(&mut self) -> Result<()> {
        self.expect_punct(')')
    }

    fn parse_u32(&mut self) -> Result<u32> {
        self.skip_comma();
        match self.next()? {
            Token::Number(value) => u32::try_from(value)
                .map_err(|_| SigilError::malformed(format!("value {value} exceeds u32"))),
            token => Err(SigilError::malformed(format!(
                "expected a number, found {}",
                token.describe()
            ))),
        }
    }

    fn parse_bool(&mut self) -> Result<bool> {
        self.skip_comma();
        match self.next()? {
            Token::Ident(word) if word == "true" => Ok(true),
            Token::Ident(word) if word == "false" => Ok(false),
            token => Err(SigilError::malformed(format!(
                "expected true or false, found {}",
                token.describe()
            ))),
        }
    }
}
