//! # Parser (C2)
//!
//! Recursive-descent, one-token lookahead, building the AST described in
//! `ast.rs` straight from the grammar:
//!
//! ```text
//! Score      := "score" String "{" ScoreHeader Part* "}"
//! ScoreHeader:= (Tempo | TimeSig | Backend | Import | Assignment)*
//! Part       := "part" Identifier "{" PartHeader (Phrase | Bar+)* "}"
//! Phrase     := "phrase" "{" "notes" ":" Bar+ ";" LyricLine ";" "}"
//! Bar        := "|" Element* "|"
//! Element    := Note | Chord | Rest | Call
//! Note       := Pitch Duration ("~")?
//! Chord      := "[" Pitch+ "]" Duration ("~")?
//! LyricLine  := ("lyrics" ("mora"|"phonemes")?) ":" LyricTok+
//! LyricTok   := Identifier | String | "_"
//! ```
//!
//! `~` binds to the element it follows; the parser never merges ties across
//! elements — that's the evaluator's job. On an unexpected token the parser
//! raises `ParseError`; at the top level (inside a part body) it resyncs on
//! the next `|`, `part`, `score`, or `}` and marks the skipped bar
//! `recovered` so the evaluator ignores it.

use crate::ast::*;
use crate::error::{MfsError, Position};
use crate::lexer::{LocatedToken, Token};

pub struct Parser {
    tokens: Vec<LocatedToken>,
    pos: usize,
    /// Parse errors recorded during best-effort resynchronisation. Errors
    /// encountered outside a recoverable context are returned immediately
    /// instead of being pushed here.
    pub errors: Vec<MfsError>,
}

/// Parse a complete source file into a `Score`, plus any recoverable parse
/// diagnostics collected along the way. A non-recoverable error (premature
/// EOF outside a bar, a malformed score/part header) is returned as `Err`.
pub fn parse(tokens: Vec<LocatedToken>) -> Result<(Score, Vec<MfsError>), MfsError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        errors: Vec::new(),
    };
    let score = parser.parse_score()?;
    Ok((score, parser.errors))
}

impl Parser {
    fn current(&self) -> &LocatedToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn position(&self) -> Position {
        self.current().position
    }

    fn token_text(token: &Token) -> String {
        match token {
            Token::Identifier(s) => format!("identifier '{s}'"),
            Token::Number(n) => format!("number '{n}'"),
            Token::Decimal(n) => format!("decimal '{n}'"),
            Token::String(s) => format!("string \"{s}\""),
            Token::PitchLit(s) => format!("pitch '{s}'"),
            Token::DurationLit(s) => format!("duration '{s}'"),
            Token::Bar => "'|'".to_string(),
            Token::LeftBrace => "'{'".to_string(),
            Token::RightBrace => "'}'".to_string(),
            Token::LeftBracket => "'['".to_string(),
            Token::RightBracket => "']'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Semicolon => "';'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Eof => "end of file".to_string(),
        }
    }

    fn advance(&mut self) -> LocatedToken {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: &str) -> MfsError {
        MfsError::ParseError {
            expected: expected.to_string(),
            found: Self::token_text(&self.current().token),
            position: self.position(),
        }
    }

    fn expect(&mut self, token: &Token, expected: &str) -> Result<LocatedToken, MfsError> {
        if &self.current().token == token {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if let Token::Identifier(s) = &self.current().token {
            if s == word {
                self.advance();
                return true;
            }
        }
        false
    }

    fn expect_keyword(&mut self, word: &str) -> Result<Position, MfsError> {
        let position = self.position();
        if self.eat_keyword(word) {
            Ok(position)
        } else {
            Err(self.error(&format!("'{word}'")))
        }
    }

    fn peek_is_keyword(&self, word: &str) -> bool {
        matches!(&self.current().token, Token::Identifier(s) if s == word)
    }

    fn expect_identifier(&mut self) -> Result<Identifier, MfsError> {
        let position = self.position();
        match self.current().token.clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(Identifier { name, position })
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn expect_string(&mut self) -> Result<(String, Position), MfsError> {
        let position = self.position();
        match self.current().token.clone() {
            Token::String(s) => {
                self.advance();
                Ok((s, position))
            }
            _ => Err(self.error("string literal")),
        }
    }

    fn expect_number(&mut self) -> Result<(i64, Position), MfsError> {
        let position = self.position();
        match self.current().token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok((n, position))
            }
            _ => Err(self.error("number")),
        }
    }

    // ---- Score / headers ----------------------------------------------

    fn parse_score(&mut self) -> Result<Score, MfsError> {
        let position = self.expect_keyword("score")?;
        let (title, _) = self.expect_string()?;
        self.expect(&Token::LeftBrace, "'{'")?;
        let header = self.parse_header(true)?;
        let mut parts = Vec::new();
        while self.peek_is_keyword("part") {
            parts.push(self.parse_part()?);
        }
        self.expect(&Token::RightBrace, "'}'")?;
        Ok(Score {
            title,
            header,
            parts,
            position,
        })
    }

    /// Parses the `(Tempo | TimeSig | Backend | Import | Assignment)*` run
    /// common to score and part headers. `allow_backend` being true just
    /// documents that both contexts accept `midi`/`vocal`; the grammar does
    /// not actually distinguish them positionally.
    fn parse_header(&mut self, _allow_backend: bool) -> Result<Vec<HeaderStmt>, MfsError> {
        let mut stmts = Vec::new();
        loop {
            if self.peek_is_keyword("tempo") {
                stmts.push(HeaderStmt::Tempo(self.parse_tempo()?));
            } else if self.peek_is_keyword("time") {
                stmts.push(HeaderStmt::TimeSig(self.parse_time_sig()?));
            } else if self.peek_is_keyword("midi") || self.peek_is_keyword("vocal") {
                stmts.push(HeaderStmt::Backend(self.parse_backend()?));
            } else if self.peek_is_keyword("import") {
                stmts.push(HeaderStmt::Import(self.parse_import()?));
            } else if matches!(&self.current().token, Token::Identifier(_))
                && self.peek_ahead_is_equals()
            {
                stmts.push(HeaderStmt::Assignment(self.parse_assignment()?));
            } else {
                break;
            }
        }
        Ok(stmts)
    }

    fn peek_ahead_is_equals(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.token == Token::Equals)
            .unwrap_or(false)
    }

    fn parse_tempo(&mut self) -> Result<Tempo, MfsError> {
        let position = self.expect_keyword("tempo")?;
        let bpm = self.parse_expr()?;
        Ok(Tempo { bpm, position })
    }

    fn parse_time_sig(&mut self) -> Result<TimeSig, MfsError> {
        let position = self.expect_keyword("time")?;
        let (numerator, _) = self.expect_number()?;
        self.expect(&Token::Slash, "'/'")?;
        let (denominator, _) = self.expect_number()?;
        Ok(TimeSig {
            numerator: numerator as u32,
            denominator: denominator as u32,
            position,
        })
    }

    fn parse_backend(&mut self) -> Result<Backend, MfsError> {
        let position = self.position();
        let kind = if self.eat_keyword("midi") {
            BackendKind::Midi
        } else {
            self.expect_keyword("vocal")?;
            BackendKind::Vocal
        };
        let mut settings = Vec::new();
        while let Token::Identifier(_) = &self.current().token {
            if self.peek_ahead_is_colon() {
                let key = self.expect_identifier()?;
                self.expect(&Token::Colon, "':'")?;
                let value = self.parse_expr()?;
                settings.push((key.name, value));
            } else {
                break;
            }
        }
        Ok(Backend {
            kind,
            settings,
            position,
        })
    }

    fn peek_ahead_is_colon(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.token == Token::Colon)
            .unwrap_or(false)
    }

    fn parse_import(&mut self) -> Result<Import, MfsError> {
        let position = self.expect_keyword("import")?;
        let (path, _) = self.expect_string()?;
        Ok(Import { path, position })
    }

    fn parse_assignment(&mut self) -> Result<Assignment, MfsError> {
        let name = self.expect_identifier()?;
        let position = name.position;
        self.expect(&Token::Equals, "'='")?;
        let value = self.parse_expr()?;
        Ok(Assignment {
            name,
            mutable: false,
            value,
            position,
        })
    }

    // ---- Expressions -----------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, MfsError> {
        let position = self.position();
        match self.current().token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(n)))
            }
            Token::Decimal(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Decimal(n)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            Token::PitchLit(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Pitch(s)))
            }
            Token::DurationLit(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Duration(s)))
            }
            Token::LeftBracket => {
                self.advance();
                let mut items = Vec::new();
                while self.current().token != Token::RightBracket {
                    items.push(self.parse_expr()?);
                    if self.current().token == Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&Token::RightBracket, "']'")?;
                Ok(Expr::Literal(Literal::Array(items)))
            }
            Token::Identifier(_) => {
                let path = self.parse_dotted_path()?;
                if self.current().token == Token::LeftParen {
                    let args = self.parse_call_args()?;
                    Ok(Expr::Call(Call { path, args, position }))
                } else {
                    Ok(Expr::Identifier(Identifier {
                        name: path.join("."),
                        position,
                    }))
                }
            }
            _ => Err(self.error("expression")),
        }
    }

    /// `Identifier ("." Identifier)*`, e.g. `theory.majorTriad`.
    fn parse_dotted_path(&mut self) -> Result<Vec<String>, MfsError> {
        let mut path = vec![self.expect_identifier()?.name];
        while self.current().token == Token::Dot {
            self.advance();
            path.push(self.expect_identifier()?.name);
        }
        Ok(path)
    }

    /// `"(" (Expr ("," Expr)*)? ")"`.
    fn parse_call_args(&mut self) -> Result<Vec<Expr>, MfsError> {
        self.expect(&Token::LeftParen, "'('")?;
        let mut args = Vec::new();
        while self.current().token != Token::RightParen {
            args.push(self.parse_expr()?);
            if self.current().token == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RightParen, "')'")?;
        Ok(args)
    }

    // ---- Parts -------------------------------------------------------

    fn parse_part(&mut self) -> Result<Part, MfsError> {
        let position = self.expect_keyword("part")?;
        let name = self.expect_identifier()?;
        self.expect(&Token::LeftBrace, "'{'")?;
        let header = self.parse_header(true)?;
        let mut body = Vec::new();
        loop {
            if self.peek_is_keyword("phrase") {
                body.push(PartBody::Phrase(self.parse_phrase()?));
            } else if self.current().token == Token::Bar {
                match self.parse_bar() {
                    Ok(bar) => body.push(PartBody::Bar(bar)),
                    Err(err) => {
                        self.errors.push(err);
                        body.push(PartBody::Bar(self.resync_to_safe_point()));
                    }
                }
            } else {
                break;
            }
        }
        self.expect(&Token::RightBrace, "'}'")?;
        Ok(Part {
            name,
            header,
            body,
            position,
        })
    }

    /// Skip tokens until the next `|`, `part`, `score`, or `}`, returning a
    /// bar marked `recovered` so the evaluator ignores whatever was skipped.
    /// The stopping `|` itself is left unconsumed: because bar delimiters
    /// alternate open/close, that token is the *next* bar's opener, not a
    /// closer to swallow here.
    fn resync_to_safe_point(&mut self) -> Bar {
        let position = self.position();
        while !matches!(
            &self.current().token,
            Token::Bar | Token::RightBrace | Token::Eof
        ) && !self.peek_is_keyword("part")
            && !self.peek_is_keyword("score")
        {
            self.advance();
        }
        Bar {
            elements: Vec::new(),
            position,
            recovered: true,
        }
    }

    fn parse_phrase(&mut self) -> Result<Phrase, MfsError> {
        let position = self.expect_keyword("phrase")?;
        self.expect(&Token::LeftBrace, "'{'")?;
        self.expect_keyword("notes")?;
        self.expect(&Token::Colon, "':'")?;
        let mut bars = Vec::new();
        while self.current().token == Token::Bar {
            bars.push(self.parse_bar()?);
        }
        self.expect(&Token::Semicolon, "';'")?;
        let lyrics = self.parse_lyric_line()?;
        self.expect(&Token::Semicolon, "';'")?;
        self.expect(&Token::RightBrace, "'}'")?;
        Ok(Phrase {
            bars,
            lyrics,
            position,
        })
    }

    fn parse_lyric_line(&mut self) -> Result<LyricLine, MfsError> {
        let position = self.expect_keyword("lyrics")?;
        let mode = if self.eat_keyword("mora") {
            LyricMode::Mora
        } else if self.eat_keyword("phonemes") {
            LyricMode::Phonemes
        } else {
            LyricMode::Text
        };
        self.expect(&Token::Colon, "':'")?;
        let mut tokens = Vec::new();
        loop {
            match self.current().token.clone() {
                Token::Identifier(s) if s == "_" => {
                    self.advance();
                    tokens.push(LyricTok::Extend);
                }
                Token::Identifier(s) => {
                    self.advance();
                    if s == "_" {
                        tokens.push(LyricTok::Extend);
                    } else {
                        tokens.push(LyricTok::Word(s));
                    }
                }
                Token::String(s) => {
                    self.advance();
                    tokens.push(LyricTok::Quoted(s));
                }
                _ => break,
            }
        }
        Ok(LyricLine {
            mode,
            tokens,
            position,
        })
    }

    fn parse_bar(&mut self) -> Result<Bar, MfsError> {
        let position = self.position();
        self.expect(&Token::Bar, "'|'")?;
        let mut elements = Vec::new();
        while self.current().token != Token::Bar {
            if self.current().token == Token::Eof {
                return Err(self.error("'|'"));
            }
            elements.push(self.parse_element()?);
        }
        self.advance(); // closing '|'
        Ok(Bar {
            elements,
            position,
            recovered: false,
        })
    }

    fn parse_element(&mut self) -> Result<Element, MfsError> {
        let position = self.position();
        match self.current().token.clone() {
            Token::PitchLit(raw) => {
                self.advance();
                let pitch = PitchLit { raw, position };
                let (duration, tie) = self.parse_duration_and_tie()?;
                Ok(Element::Note(Note {
                    pitch,
                    duration,
                    tie,
                    position,
                }))
            }
            Token::LeftBracket => {
                self.advance();
                let mut pitches = Vec::new();
                loop {
                    let pitch_pos = self.position();
                    match self.current().token.clone() {
                        Token::PitchLit(raw) => {
                            self.advance();
                            pitches.push(PitchLit {
                                raw,
                                position: pitch_pos,
                            });
                        }
                        _ => break,
                    }
                }
                if pitches.is_empty() {
                    return Err(self.error("pitch"));
                }
                self.expect(&Token::RightBracket, "']'")?;
                let (duration, tie) = self.parse_duration_and_tie()?;
                Ok(Element::Chord(Chord {
                    pitches,
                    duration,
                    tie,
                    position,
                }))
            }
            Token::DurationLit(raw) => {
                // A bare duration with no pitch is a rest.
                self.advance();
                Ok(Element::Rest(Rest {
                    duration: DurationLit { raw, position },
                    position,
                }))
            }
            Token::Identifier(_) => {
                let path = self.parse_dotted_path()?;
                let args = self.parse_call_args()?;
                Ok(Element::Call(ElementCall {
                    call: Call { path, args, position },
                }))
            }
            _ => Err(self.error("note, chord, rest, or call")),
        }
    }

    /// A `Note`/`Chord` is followed by a `DurationLit` token whose own
    /// trailing `~` (already captured by the lexer) carries the tie flag.
    fn parse_duration_and_tie(&mut self) -> Result<(DurationLit, bool), MfsError> {
        let position = self.position();
        match self.current().token.clone() {
            Token::DurationLit(raw) => {
                self.advance();
                let tie = raw.ends_with('~');
                Ok((DurationLit { raw, position }, tie))
            }
            _ => Err(self.error("duration")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_source(src: &str) -> (Score, Vec<MfsError>) {
        let tokens = Lexer::new(src).tokenize().unwrap();
        parse(tokens).unwrap()
    }

    #[test]
    fn simple_midi_score() {
        let (score, errors) = parse_source(
            r#"score "Test"{ tempo 120 time 4/4 part Piano { midi ch:1 program:0 | C4 q D4 q E4 q F4 q | } }"#,
        );
        assert!(errors.is_empty());
        assert_eq!(score.title, "Test");
        assert_eq!(score.parts.len(), 1);
        let part = &score.parts[0];
        assert_eq!(part.name.name, "Piano");
        assert_eq!(part.body.len(), 1);
        match &part.body[0] {
            PartBody::Bar(bar) => assert_eq!(bar.elements.len(), 4),
            _ => panic!("expected a bar"),
        }
    }

    #[test]
    fn vocal_phrase_with_mora_lyrics() {
        let (score, errors) = parse_source(
            r#"score "V"{ tempo 120 time 4/4 part Vocal { phrase { notes: | C4 q D4 q E4 q F4 q |; lyrics mora: a b c d; } } }"#,
        );
        assert!(errors.is_empty());
        let part = &score.parts[0];
        match &part.body[0] {
            PartBody::Phrase(phrase) => {
                assert_eq!(phrase.lyrics.mode, LyricMode::Mora);
                assert_eq!(phrase.lyrics.tokens.len(), 4);
            }
            _ => panic!("expected a phrase"),
        }
    }

    #[test]
    fn tied_notes_and_chord() {
        let (score, errors) =
            parse_source(r#"score "T"{ part P { midi ch:1 | [C4 E4 G4] h~ C4 h | } }"#);
        assert!(errors.is_empty());
        let part = &score.parts[0];
        match &part.body[0] {
            PartBody::Bar(bar) => {
                assert_eq!(bar.elements.len(), 2);
                match &bar.elements[0] {
                    Element::Chord(c) => {
                        assert_eq!(c.pitches.len(), 3);
                        assert!(c.tie);
                    }
                    _ => panic!("expected chord"),
                }
            }
            _ => panic!("expected a bar"),
        }
    }

    #[test]
    fn malformed_bar_is_recovered_not_fatal() {
        // `trill` with no argument list is a parse error inside the first bar;
        // the second bar should still parse cleanly.
        let (score, errors) =
            parse_source(r#"score "T"{ part P { midi ch:1 | trill | D4 q | } }"#);
        assert_eq!(errors.len(), 1);
        let part = &score.parts[0];
        assert_eq!(part.body.len(), 2);
        match &part.body[0] {
            PartBody::Bar(bar) => assert!(bar.recovered),
            _ => panic!("expected a recovered bar"),
        }
        match &part.body[1] {
            PartBody::Bar(bar) => assert_eq!(bar.elements.len(), 2),
            _ => panic!("expected a clean bar"),
        }
    }

    #[test]
    fn import_statement() {
        let (score, errors) =
            parse_source(r#"score "T"{ import "std:theory" part P { midi ch:1 | | } } "#);
        assert!(errors.is_empty());
        assert_eq!(score.header.len(), 1);
        match &score.header[0] {
            HeaderStmt::Import(i) => assert_eq!(i.path, "std:theory"),
            _ => panic!("expected import"),
        }
    }
}
