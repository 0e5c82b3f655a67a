use super::{Result, ScriptError};

/// Lexical tokens. Keywords are reported as [`Token::Name`]; the parser decides.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// String literal with escapes resolved.
    Str(String),
    /// Identifier or keyword.
    Name(String),
    /// Operator or punctuation.
    Op(&'static str),
    /// Logical end of line (outside brackets).
    Newline,
    /// End of input.
    Eof,
}

/// Token plus the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// 1-based line number.
    pub line: usize,
}

const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", "==", "!=", "<>", "<=", ">=", "+=", "-=", "*=", "/=",
];
const ONE_CHAR_OPS: &[&str] = &[
    "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=", "<", ">", "+", "-", "*", "/", "%",
];

/// Split console source into tokens. The result always ends with [`Token::Eof`].
pub fn tokenize(source: &str, file: &str) -> Result<Vec<Spanned>> {
    let mut lexer = Lexer::new(source, file);
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    file: &'a str,
    index: usize,
    line: usize,
    depth: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, file: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            file,
            index: 0,
            line: 1,
            depth: 0,
        }
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn advance(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }

    fn next_token(&mut self) -> Result<Spanned> {
        loop {
            match self.current() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => self.advance(),
                Some(b'#') => {
                    while let Some(ch) = self.current() {
                        if ch == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'\\') if self.peek(1) == Some(b'\n') => {
                    self.advance();
                    self.advance();
                    self.line += 1;
                }
                Some(b'\n') => {
                    let line = self.line;
                    self.advance();
                    self.line += 1;
                    if self.depth == 0 {
                        return Ok(self.spanned(Token::Newline, line));
                    }
                }
                _ => break,
            }
        }

        let line = self.line;
        let Some(ch) = self.current() else {
            return Ok(self.spanned(Token::Eof, line));
        };

        let token = match ch {
            b'0'..=b'9' => self.lex_number()?,
            b'.' if self.peek(1).is_some_and(|next| next.is_ascii_digit()) => self.lex_number()?,
            b'"' | b'\'' => self.lex_string(ch)?,
            _ if ch == b'_' || ch.is_ascii_alphabetic() || ch >= 0x80 => self.lex_name()?,
            _ => self.lex_op()?,
        };
        Ok(self.spanned(token, line))
    }

    fn spanned(&self, token: Token, line: usize) -> Spanned {
        Spanned { token, line }
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.index;
        let mut is_float = false;
        self.skip_digits();
        if self.current() == Some(b'.') && self.peek(1).is_some_and(|next| next.is_ascii_digit()) {
            is_float = true;
            self.advance();
            self.skip_digits();
        }
        if matches!(self.current(), Some(b'e') | Some(b'E')) {
            let sign = matches!(self.peek(1), Some(b'+') | Some(b'-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digit_at {
                    self.advance();
                }
                self.skip_digits();
            }
        }

        let text = &self.src[start..self.index];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error("invalid float literal"))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error("integer literal too large"))
        }
    }

    fn skip_digits(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, quote: u8) -> Result<Token> {
        self.advance();
        let mut buf = String::new();
        loop {
            let Some(ch) = self.current() else {
                return Err(self.error("unterminated string literal"));
            };
            match ch {
                b'\n' => return Err(self.error("unterminated string literal")),
                _ if ch == quote => {
                    self.advance();
                    return Ok(Token::Str(buf));
                }
                b'\\' => {
                    self.advance();
                    let escaped = self
                        .current()
                        .ok_or_else(|| self.error("unterminated string literal"))?;
                    self.advance();
                    match escaped {
                        b'n' => buf.push('\n'),
                        b't' => buf.push('\t'),
                        b'r' => buf.push('\r'),
                        b'0' => buf.push('\0'),
                        b'\\' => buf.push('\\'),
                        b'\'' => buf.push('\''),
                        b'"' => buf.push('"'),
                        b'\n' => self.line += 1,
                        other => {
                            buf.push('\\');
                            self.index -= 1;
                            if other < 0x80 {
                                buf.push(other as char);
                                self.advance();
                            }
                        }
                    }
                }
                _ if ch < 0x80 => {
                    buf.push(ch as char);
                    self.advance();
                }
                _ => {
                    let decoded = self.src[self.index..]
                        .chars()
                        .next()
                        .ok_or_else(|| self.error("invalid character in string"))?;
                    buf.push(decoded);
                    self.index += decoded.len_utf8();
                }
            }
        }
    }

    fn lex_name(&mut self) -> Result<Token> {
        let start = self.index;
        for ch in self.src[start..].chars() {
            if ch == '_' || ch.is_alphanumeric() {
                self.index += ch.len_utf8();
            } else {
                break;
            }
        }
        if start == self.index {
            return Err(self.error("invalid character in identifier"));
        }
        Ok(Token::Name(self.src[start..self.index].to_string()))
    }

    fn lex_op(&mut self) -> Result<Token> {
        let rest = &self.src[self.index..];
        for op in TWO_CHAR_OPS.iter().chain(ONE_CHAR_OPS.iter()) {
            if rest.starts_with(op) {
                self.index += op.len();
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                return Ok(Token::Op(op));
            }
        }
        let ch = rest.chars().next().unwrap_or('?');
        Err(self.error(&format!("invalid character '{}'", ch)))
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::syntax(message).with_frame(self.file, self.line, "<module>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source, "<test>")
            .expect("tokenize")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn lexes_arithmetic() {
        assert_eq!(
            kinds("1+2.5"),
            vec![Token::Int(1), Token::Op("+"), Token::Float(2.5), Token::Eof]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_joined() {
        let tokens = kinds("[1,\n 2]\nx");
        assert_eq!(
            tokens,
            vec![
                Token::Op("["),
                Token::Int(1),
                Token::Op(","),
                Token::Int(2),
                Token::Op("]"),
                Token::Newline,
                Token::Name("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn strings_resolve_escapes_and_unicode() {
        assert_eq!(
            kinds(r#"'a\'b\n' "héllo""#),
            vec![
                Token::Str("a'b\n".into()),
                Token::Str("héllo".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("x # note"), vec![Token::Name("x".into()), Token::Eof]);
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("x = 1\ny = 'oops", "<stdin>").unwrap_err();
        assert_eq!(err.kind, super::super::ErrorKind::SyntaxError);
        assert_eq!(err.traceback[0].line, 2);
    }
}
