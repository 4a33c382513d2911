/*!
Reads the entities out of a model answer.

Models are asked to answer with `["entity_type", "entity_name"]` pairs, but they take liberties
with the format: several pairs on one line separated by commas, one pair per line, a nested list
of pairs, bare (unquoted) entity types or empty lists to say "nothing here". All of these are
accepted. Anything that is not a list/tuple literal, or a literal followed by commentary, is
rejected with a [`ParseResponseError`] so the caller can pick a fallback.

The literal grammar is deliberately small:

```text
sequence := value ("," value)* ","?            (more than one value makes a tuple)
value    := string | list | tuple | atom
list     := "[" (value ("," value)* ","?)? "]"
tuple    := "(" ")" | "(" value "," (value ("," value)* ","?)? ")" | "(" value ")"
string   := '"' chars '"' | "'" chars "'"
atom     := number | "True" | "False" | "None"
```
*/
use crate::entity::RecognizedEntity;
use crate::labels::EntityType;
use enum_iterator::all;
use itertools::Itertools;
use regex::Regex;
use std::borrow::Cow;
use std::error::Error;
use std::fmt::Display;
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::OnceLock;

/// Parses a model answer into `(type, name)` pairs.
///
/// * `None` (the upstream call failed) and `"[]"` give no entity.
/// * Multi-line answers are parsed line by line and concatenated. A single malformed line fails
///   the whole answer.
/// * Only entries made of exactly two strings are kept; neither the type nor the name is checked.
///
/// ```rust
/// use iobtag::{parse_response, RecognizedEntity};
///
/// let entities = parse_response(Some(r#"[Location, "AL-AIN"], [Miscellaneous, "1996-12-06"]"#)).unwrap();
/// assert_eq!(
///     entities,
///     vec![
///         RecognizedEntity::new("Location", "AL-AIN"),
///         RecognizedEntity::new("Miscellaneous", "1996-12-06")
///     ]
/// );
/// assert!(parse_response(Some(r#"["Location", "Syria"] (no Person entity is mentioned)"#)).is_err());
/// ```
pub fn parse_response(response: Option<&str>) -> Result<Vec<RecognizedEntity>, ParseResponseError> {
    let response = match response {
        Some(r) => r,
        None => return Ok(vec![]),
    };
    if response.trim() == "[]" {
        return Ok(vec![]);
    }
    if response.contains('\n') {
        let mut entities = Vec::new();
        for line in response.trim_end().split('\n') {
            entities.extend(parse_response(Some(line))?);
        }
        return Ok(entities);
    }
    let normalized = quote_bare_types(response);
    let literal = Parser::new(&normalized)
        .parse()
        .map_err(|kind| ParseResponseError::new(&normalized, kind))?;
    literal
        .into_entities()
        .map_err(|kind| ParseResponseError::new(&normalized, kind))
}

/// Matches a bare entity type opening a list, e.g. `[Location,`.
fn bare_type_regex() -> &'static Regex {
    static BARE_TYPE: OnceLock<Regex> = OnceLock::new();
    BARE_TYPE.get_or_init(|| {
        let alternatives = all::<EntityType>().map(|t| t.verbose()).join("|");
        Regex::new(&format!(r"\[({}),", alternatives)).expect("hardcoded regex is valid")
    })
}

/// Quotes the four known entity types when the model forgot to, e.g. `[Location, "JAPAN"]`
/// becomes `["Location", "JAPAN"]`. Other bare words are left alone.
pub(crate) fn quote_bare_types(response: &str) -> Cow<'_, str> {
    bare_type_regex().replace_all(response, r#"["${1}","#)
}

/// The answer could not be read as a list of pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResponseError {
    /// The (normalized) text that failed to parse.
    pub response: String,
    pub kind: ParseResponseErrorKind,
}

impl ParseResponseError {
    fn new(response: &str, kind: ParseResponseErrorKind) -> Self {
        Self {
            response: response.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResponseErrorKind {
    /// The text is not a literal. `position` is a character offset.
    Syntax {
        position: usize,
        message: &'static str,
    },
    /// A literal was read but some text follows it, usually an explanation from the model.
    TrailingInput { position: usize },
    /// The literal is neither a list nor a tuple (e.g. a bare string).
    UnexpectedShape,
}

impl Display for ParseResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseResponseErrorKind::Syntax { position, message } => write!(
                f,
                "Invalid response {:?}: {} at position {}",
                self.response, message, position
            ),
            ParseResponseErrorKind::TrailingInput { position } => write!(
                f,
                "Invalid response {:?}: unexpected text after the literal at position {}",
                self.response, position
            ),
            ParseResponseErrorKind::UnexpectedShape => write!(
                f,
                "Invalid response {:?}: expected a list or a tuple",
                self.response
            ),
        }
    }
}

impl Error for ParseResponseError {}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    /// Numbers, booleans and `None`. They are valid but never part of a pair.
    Atom,
}

impl Literal {
    fn into_entities(self) -> Result<Vec<RecognizedEntity>, ParseResponseErrorKind> {
        match self {
            Literal::List(items) => match items.first() {
                None => Ok(vec![]),
                // Nested list of pairs. Empty entries are simply dropped.
                Some(Literal::List(_)) | Some(Literal::Tuple(_)) => {
                    Ok(items.into_iter().filter_map(Literal::into_pair).collect())
                }
                Some(_) => Ok(Literal::List(items).into_pair().into_iter().collect()),
            },
            Literal::Tuple(items) => Ok(items.into_iter().filter_map(Literal::into_pair).collect()),
            Literal::Str(_) | Literal::Atom => Err(ParseResponseErrorKind::UnexpectedShape),
        }
    }

    fn into_pair(self) -> Option<RecognizedEntity> {
        let items = match self {
            Literal::List(items) | Literal::Tuple(items) => items,
            _ => return None,
        };
        match <[Literal; 2]>::try_from(items) {
            Ok([Literal::Str(entity_type), Literal::Str(name)]) => {
                Some(RecognizedEntity { entity_type, name })
            }
            _ => None,
        }
    }
}

type ParseResult<T> = Result<T, ParseResponseErrorKind>;

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
    /// Number of chars consumed so far
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            position: 0,
        }
    }

    fn parse(mut self) -> ParseResult<Literal> {
        self.skip_whitespace();
        let first = self.value()?;
        self.skip_whitespace();
        let literal = if self.peek() == Some(',') {
            let mut items = vec![first];
            self.bump();
            self.sequence_tail(&mut items, None)?;
            Literal::Tuple(items)
        } else {
            first
        };
        self.skip_whitespace();
        match self.peek() {
            None => Ok(literal),
            Some(_) => Err(ParseResponseErrorKind::TrailingInput {
                position: self.position,
            }),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let next = self.chars.next().map(|(_, c)| c);
        if next.is_some() {
            self.position += 1;
        }
        next
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn syntax_error<T>(&self, message: &'static str) -> ParseResult<T> {
        Err(ParseResponseErrorKind::Syntax {
            position: self.position,
            message,
        })
    }

    fn value(&mut self) -> ParseResult<Literal> {
        match self.peek() {
            Some('[') => {
                self.bump();
                let mut items = Vec::new();
                self.sequence_tail(&mut items, Some(']'))?;
                Ok(Literal::List(items))
            }
            Some('(') => self.parenthesized(),
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.string(quote).map(Literal::Str)
            }
            Some(c) if c.is_ascii_alphanumeric() || c == '-' || c == '+' || c == '.' => self.atom(),
            Some(_) => self.syntax_error("unexpected character"),
            None => self.syntax_error("unexpected end of input"),
        }
    }

    /// Reads comma separated values until `closing` (or the end of the input when `closing` is
    /// `None`). A trailing comma is accepted.
    fn sequence_tail(&mut self, items: &mut Vec<Literal>, closing: Option<char>) -> ParseResult<()> {
        loop {
            self.skip_whitespace();
            match (self.peek(), closing) {
                (Some(c), Some(close)) if c == close => {
                    self.bump();
                    return Ok(());
                }
                (None, None) => return Ok(()),
                (None, Some(_)) => return self.syntax_error("unclosed bracket"),
                // top-level tuples stop at anything that cannot start a value
                (Some(c), None) if !Self::starts_value(c) => return Ok(()),
                _ => (),
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match (self.peek(), closing) {
                (Some(','), _) => {
                    self.bump();
                }
                (Some(c), Some(close)) if c == close => {
                    self.bump();
                    return Ok(());
                }
                (_, None) => return Ok(()),
                (None, Some(_)) => return self.syntax_error("unclosed bracket"),
                (Some(_), Some(_)) => return self.syntax_error("expected a comma"),
            }
        }
    }

    fn starts_value(c: char) -> bool {
        matches!(c, '[' | '(' | '"' | '\'' | '-' | '+' | '.') || c.is_ascii_alphanumeric()
    }

    fn parenthesized(&mut self) -> ParseResult<Literal> {
        self.bump();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(Literal::Tuple(vec![]));
        }
        let first = self.value()?;
        self.skip_whitespace();
        match self.bump() {
            // grouping parenthesis, not a tuple
            Some(')') => Ok(first),
            Some(',') => {
                let mut items = vec![first];
                self.sequence_tail(&mut items, Some(')'))?;
                Ok(Literal::Tuple(items))
            }
            Some(_) => self.syntax_error("expected a comma"),
            None => self.syntax_error("unclosed parenthesis"),
        }
    }

    fn string(&mut self, quote: char) -> ParseResult<String> {
        let mut content = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return self.syntax_error("unterminated string"),
                Some(c) if c == quote => return Ok(content),
                Some('\\') => self.escape(&mut content)?,
                Some(c) => content.push(c),
            }
        }
    }

    fn escape(&mut self, content: &mut String) -> ParseResult<()> {
        match self.bump() {
            Some('n') => content.push('\n'),
            Some('t') => content.push('\t'),
            Some('r') => content.push('\r'),
            Some('u') => {
                let mut code = 0;
                for _ in 0..4 {
                    match self.bump().and_then(|c| c.to_digit(16)) {
                        Some(d) => code = code * 16 + d,
                        None => return self.syntax_error("invalid unicode escape"),
                    }
                }
                match char::from_u32(code) {
                    Some(c) => content.push(c),
                    None => return self.syntax_error("invalid unicode escape"),
                }
            }
            Some(c @ ('\\' | '\'' | '"')) => content.push(c),
            // Unknown escapes are kept as is
            Some(c) => {
                content.push('\\');
                content.push(c);
            }
            None => return self.syntax_error("unterminated string"),
        }
        Ok(())
    }

    fn atom(&mut self) -> ParseResult<Literal> {
        let start = self.position;
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let is_number = word.parse::<f64>().is_ok() && !word.chars().any(char::is_alphabetic)
            || word.chars().all(|c| c.is_ascii_digit() || c == '_');
        if is_number || matches!(word.as_str(), "True" | "False" | "None") {
            Ok(Literal::Atom)
        } else {
            Err(ParseResponseErrorKind::Syntax {
                position: start,
                message: "unexpected identifier",
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn pairs(entities: &[(&str, &str)]) -> Vec<RecognizedEntity> {
        entities
            .iter()
            .map(|(t, n)| RecognizedEntity::new(*t, *n))
            .collect()
    }

    #[rstest]
    #[case(r#"["Location", "JAPAN"]"#, vec![("Location", "JAPAN")])]
    #[case(
        r#"["Location", "Syria"], ["Organization", "opening meeting"]"#,
        vec![("Location", "Syria"), ("Organization", "opening meeting")]
    )]
    #[case(r#"["Location", "Syria"], ["[]"]"#, vec![("Location", "Syria")])]
    #[case(
        "[\"Location\", \"JAPAN\"]\n[\"Location\", \"CHINA\"]",
        vec![("Location", "JAPAN"), ("Location", "CHINA")]
    )]
    #[case(
        "[\"Location\", \"JAPAN\"]\n[\"Location\", \"CHINA\"]\n[]",
        vec![("Location", "JAPAN"), ("Location", "CHINA")]
    )]
    #[case(
        r#"[Location, "AL-AIN"], [Miscellaneous, "1996-12-06"]"#,
        vec![("Location", "AL-AIN"), ("Miscellaneous", "1996-12-06")]
    )]
    #[case("[]", vec![])]
    #[case("[] ", vec![])]
    #[case("[ ]", vec![])]
    #[case("[[], [], [], []]", vec![])]
    #[case(
        r#"[["Person", "Takuya Takagi"], ["Location", "group C"]]"#,
        vec![("Person", "Takuya Takagi"), ("Location", "group C")]
    )]
    #[case(r#"['Person', 'O\'Neill']"#, vec![("Person", "O'Neill")])]
    #[case(r#"("Person", "Nadim Ladki"),"#, vec![("Person", "Nadim Ladki")])]
    #[case(r#"["Date", "Friday"]"#, vec![("Date", "Friday")])]
    #[case(r#"["Location", "JAPAN", "CHINA"]"#, vec![])]
    #[case(r#"[["Location"], ["Person", "Ladki"], [1, 2]]"#, vec![("Person", "Ladki")])]
    #[case("[\"Location\", \"JAPAN\"]\n", vec![("Location", "JAPAN")])]
    fn test_parse_response(#[case] response: &str, #[case] expected: Vec<(&str, &str)>) {
        assert_eq!(parse_response(Some(response)).unwrap(), pairs(&expected))
    }

    #[test]
    fn test_absent_response() {
        assert_eq!(parse_response(None).unwrap(), vec![])
    }

    #[rstest]
    #[case(r#"["Location", "Syria"] (no Person entity is mentioned)"#)]
    #[case(r#"[] (no entity for "favourites")"#)]
    #[case("There are no entities in this sentence.")]
    #[case(r#"["Location", "JAPAN""#)]
    #[case(r#"["Location" "JAPAN"]"#)]
    #[case(r#"["Location", "JAPAN]"#)]
    #[case("[\"Location\", \"JAPAN\"]\n\n[\"Location\", \"CHINA\"]")]
    #[case("[\"Location\", \"JAPAN\"]\nNo other entity")]
    #[case(r#""JAPAN""#)]
    #[case("")]
    fn test_parse_response_errors(#[case] response: &str) {
        assert!(parse_response(Some(response)).is_err())
    }

    #[test]
    fn test_error_kinds() {
        let err = parse_response(Some(r#"["Location", "Syria"] (no Person entity is mentioned)"#))
            .unwrap_err();
        assert_eq!(err.kind, ParseResponseErrorKind::TrailingInput { position: 22 });
        let err = parse_response(Some(r#""JAPAN""#)).unwrap_err();
        assert_eq!(err.kind, ParseResponseErrorKind::UnexpectedShape);
        let err = parse_response(Some("[Date, \"Friday\"]")).unwrap_err();
        assert!(matches!(err.kind, ParseResponseErrorKind::Syntax { .. }));
    }

    #[rstest]
    #[case(r#"[Location, "JAPAN"]"#, r#"["Location", "JAPAN"]"#)]
    #[case(r#"[[Person, "A"], [Organization, "B"]]"#, r#"[["Person", "A"], ["Organization", "B"]]"#)]
    #[case(r#"[Date, "Friday"]"#, r#"[Date, "Friday"]"#)]
    #[case(r#"[location, "JAPAN"]"#, r#"[location, "JAPAN"]"#)]
    fn test_quote_bare_types(#[case] response: &str, #[case] expected: &str) {
        assert_eq!(quote_bare_types(response), expected)
    }
}
