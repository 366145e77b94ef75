//! # Source Reader & Lexer (C1)
//!
//! Turns MFS source text into a flat stream of [`LocatedToken`]s with
//! `(line, column, byte-offset)` positions. Whitespace and comments (`//`
//! line, `/* */` block) are skipped as trivia but still delimit tokens.
//!
//! Keywords are not a distinct lexical class: the lexer only ever produces
//! `Identifier` for word-shaped lexemes, and the parser is the one that
//! decides whether a given identifier text (`score`, `part`, `tempo`, ...)
//! is being used as a keyword in context.

use crate::error::{MfsError, Position};

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    Number(i64),
    Decimal(f64),
    String(String),
    /// Raw pitch lexeme (e.g. `"C4"`, `"F#3"`, `"Bb5"`, `"A4+15c"`); parsed
    /// into a `music::Pitch` by the parser.
    PitchLit(String),
    /// Raw duration lexeme (e.g. `"q"`, `"h."`, `"e~"`, `"32t3"`); parsed
    /// into a `music::DurationSpec` by the parser.
    DurationLit(String),
    Bar,          // |
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    Colon,        // :
    Semicolon,    // ;
    Slash,        // /
    Equals,       // =
    Comma,        // ,
    Dot,          // .
    LeftParen,    // (
    RightParen,   // )
    Eof,
}

/// A token together with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedToken {
    pub token: Token,
    pub position: Position,
}

const DURATION_LETTERS: [char; 5] = ['w', 'h', 'q', 'e', 's'];

pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn pos(&self, offset: usize) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_offset(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len())
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn rest_from(&self, offset: usize) -> &'a str {
        &self.input[offset..]
    }

    /// Tokenize the whole source in one pass.
    pub fn tokenize(&mut self) -> Result<Vec<LocatedToken>, MfsError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let offset = self.peek_offset();
            let position = self.pos(offset);
            let Some(c) = self.peek_char() else {
                tokens.push(LocatedToken {
                    token: Token::Eof,
                    position,
                });
                break;
            };

            let token = match c {
                '|' => {
                    self.bump();
                    Token::Bar
                }
                '{' => {
                    self.bump();
                    Token::LeftBrace
                }
                '}' => {
                    self.bump();
                    Token::RightBrace
                }
                '[' => {
                    self.bump();
                    Token::LeftBracket
                }
                ']' => {
                    self.bump();
                    Token::RightBracket
                }
                ':' => {
                    self.bump();
                    Token::Colon
                }
                ';' => {
                    self.bump();
                    Token::Semicolon
                }
                '/' => {
                    self.bump();
                    Token::Slash
                }
                '=' => {
                    self.bump();
                    Token::Equals
                }
                ',' => {
                    self.bump();
                    Token::Comma
                }
                '.' => {
                    self.bump();
                    Token::Dot
                }
                '(' => {
                    self.bump();
                    Token::LeftParen
                }
                ')' => {
                    self.bump();
                    Token::RightParen
                }
                '"' => self.read_string(position)?,
                '0'..='9' => self.read_number_or_duration(offset)?,
                c if ('A'..='G').contains(&c) => self.read_pitch_or_identifier(offset)?,
                c if c.is_alphabetic() || c == '_' => self.read_identifier_or_duration(offset)?,
                other => {
                    return Err(MfsError::LexError {
                        line: position.line,
                        column: position.column,
                        message: format!("unexpected character: '{other}'"),
                    });
                }
            };

            tokens.push(LocatedToken { token, position });
        }
        Ok(tokens)
    }

    fn skip_trivia(&mut self) -> Result<(), MfsError> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let offset = self.peek_offset();
                    if self.rest_from(offset).starts_with("//") {
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else if self.rest_from(offset).starts_with("/*") {
                        let start = self.pos(offset);
                        self.bump();
                        self.bump();
                        let mut closed = false;
                        while let Some(c) = self.peek_char() {
                            if c == '*' && self.rest_from(self.peek_offset()).starts_with("*/") {
                                self.bump();
                                self.bump();
                                closed = true;
                                break;
                            }
                            self.bump();
                        }
                        if !closed {
                            return Err(MfsError::LexError {
                                line: start.line,
                                column: start.column,
                                message: "unterminated block comment".to_string(),
                            });
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_string(&mut self, position: Position) -> Result<Token, MfsError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some(other) => value.push(other),
                    None => {
                        return Err(MfsError::LexError {
                            line: position.line,
                            column: position.column,
                            message: "unterminated string literal".to_string(),
                        })
                    }
                },
                Some(c) => value.push(c),
                None => {
                    return Err(MfsError::LexError {
                        line: position.line,
                        column: position.column,
                        message: "unterminated string literal".to_string(),
                    })
                }
            }
        }
        Ok(Token::String(value))
    }

    /// Greedily match the duration-literal grammar against `rest` (after its
    /// leading letter/digits), returning the matched byte length, provided
    /// the character right after it does not continue an identifier
    /// (otherwise it's a longer word, e.g. `score`).
    fn match_duration_suffix(rest: &str) -> usize {
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len() && bytes[i] as char == '.' {
            i += 1;
        }
        if i < bytes.len() && bytes[i] as char == 't' {
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] as char).is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 {
                i = j;
            }
        }
        if i < bytes.len() && bytes[i] as char == '~' {
            i += 1;
        }
        i
    }

    fn read_identifier_or_duration(&mut self, offset: usize) -> Result<Token, MfsError> {
        let head = self.peek_char().unwrap();
        if DURATION_LETTERS.contains(&head) {
            let rest = self.rest_from(offset);
            let suffix_len = Self::match_duration_suffix(&rest[1..]);
            let lexeme_len = 1 + suffix_len;
            let next = rest.as_bytes().get(lexeme_len).map(|b| *b as char);
            let continues_identifier = matches!(next, Some(c) if c.is_alphanumeric() || c == '_');
            if !continues_identifier {
                let lexeme = &rest[..lexeme_len];
                for _ in 0..lexeme.chars().count() {
                    self.bump();
                }
                return Ok(Token::DurationLit(lexeme.to_string()));
            }
        }
        Ok(Token::Identifier(self.read_word()))
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    /// Pitches always begin with `A`-`G` and require at least one trailing
    /// digit (the octave); anything else starting with an uppercase letter
    /// (e.g. a `Part` name) is a plain identifier.
    fn read_pitch_or_identifier(&mut self, offset: usize) -> Result<Token, MfsError> {
        let rest = self.rest_from(offset);
        if let Some(len) = Self::match_pitch(rest) {
            let lexeme = &rest[..len];
            let next = rest.as_bytes().get(len).map(|b| *b as char);
            let continues_identifier = matches!(next, Some(c) if c.is_alphanumeric() || c == '_');
            if !continues_identifier {
                for _ in 0..lexeme.chars().count() {
                    self.bump();
                }
                return Ok(Token::PitchLit(lexeme.to_string()));
            }
        }
        Ok(Token::Identifier(self.read_word()))
    }

    /// Matches `^[A-G][#b]?-?\d+(?:[+-]\d+c)?`, returning the byte length
    /// consumed, or `None` if `rest` doesn't start with a pitch shape.
    fn match_pitch(rest: &str) -> Option<usize> {
        let bytes = rest.as_bytes();
        let mut i = 0;
        if bytes.is_empty() || !(b'A'..=b'G').contains(&bytes[0]) {
            return None;
        }
        i += 1;
        if i < bytes.len() && (bytes[i] == b'#' || bytes[i] == b'b') {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'-' {
            i += 1;
        }
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start {
            return None;
        }
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            let mut j = i + 1;
            let cent_digits_start = j;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > cent_digits_start && j < bytes.len() && bytes[j] == b'c' {
                i = j + 1;
            }
        }
        Some(i)
    }

    fn read_number_or_duration(&mut self, offset: usize) -> Result<Token, MfsError> {
        let rest = self.rest_from(offset);
        if rest.starts_with("32") || rest.starts_with("64") {
            let suffix_len = Self::match_duration_suffix(&rest[2..]);
            let lexeme_len = 2 + suffix_len;
            let next = rest.as_bytes().get(lexeme_len).map(|b| *b as char);
            let continues_number = matches!(next, Some(c) if c.is_ascii_digit());
            if !continues_number {
                let lexeme = &rest[..lexeme_len];
                for _ in 0..lexeme.chars().count() {
                    self.bump();
                }
                return Ok(Token::DurationLit(lexeme.to_string()));
            }
        }

        let position = self.pos(offset);
        let mut lexeme = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.') {
            let dot_offset = self.peek_offset();
            let after_dot = self.rest_from(dot_offset + 1);
            if after_dot.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                lexeme.push('.');
                self.bump();
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        lexeme.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                return lexeme.parse::<f64>().map(Token::Decimal).map_err(|e| {
                    MfsError::LexError {
                        line: position.line,
                        column: position.column,
                        message: format!("malformed decimal literal '{lexeme}': {e}"),
                    }
                });
            }
        }
        lexeme.parse::<i64>().map(Token::Number).map_err(|e| MfsError::LexError {
            line: position.line,
            column: position.column,
            message: format!("malformed integer literal '{lexeme}': {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn simple_bar_of_notes() {
        assert_eq!(
            kinds("| C4 q D4 q |"),
            vec![
                Token::Bar,
                Token::PitchLit("C4".into()),
                Token::DurationLit("q".into()),
                Token::PitchLit("D4".into()),
                Token::DurationLit("q".into()),
                Token::Bar,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_plain_identifiers() {
        assert_eq!(
            kinds("score part tempo"),
            vec![
                Token::Identifier("score".into()),
                Token::Identifier("part".into()),
                Token::Identifier("tempo".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn dotted_tied_duration() {
        assert_eq!(kinds("h.~"), vec![Token::DurationLit("h.~".into()), Token::Eof]);
    }

    #[test]
    fn tuplet_duration() {
        assert_eq!(
            kinds("e t3"),
            vec![
                Token::DurationLit("e".into()),
                Token::Identifier("t3".into()),
                Token::Eof,
            ]
        );
        // Tuplet suffix must be glued to the duration letter, not separated by whitespace.
        assert_eq!(kinds("et3"), vec![Token::DurationLit("et3".into()), Token::Eof]);
    }

    #[test]
    fn thirty_second_duration() {
        assert_eq!(kinds("32"), vec![Token::DurationLit("32".into()), Token::Eof]);
        assert_eq!(kinds("320"), vec![Token::Number(320), Token::Eof]);
    }

    #[test]
    fn pitch_with_accidental_and_cents() {
        assert_eq!(kinds("A4+15c"), vec![Token::PitchLit("A4+15c".into()), Token::Eof]);
        assert_eq!(kinds("Bb5"), vec![Token::PitchLit("Bb5".into()), Token::Eof]);
    }

    #[test]
    fn part_name_without_octave_is_identifier() {
        assert_eq!(kinds("Cello"), vec![Token::Identifier("Cello".into()), Token::Eof]);
    }

    #[test]
    fn time_signature_rational() {
        assert_eq!(
            kinds("4/4"),
            vec![Token::Number(4), Token::Slash, Token::Number(4), Token::Eof]
        );
    }

    #[test]
    fn line_and_block_comments_are_skipped() {
        assert_eq!(
            kinds("C4 // comment\n/* block */ D4"),
            vec![Token::PitchLit("C4".into()), Token::PitchLit("D4".into()), Token::Eof]
        );
    }

    #[test]
    fn unterminated_string_is_lex_error() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
    }
}
