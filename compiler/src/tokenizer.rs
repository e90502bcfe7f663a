use regex::Regex;
use lazy_static::lazy_static;
use log::debug;
use crate::utils::{quote, error};
use crate::error::IdlError;

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(
        r#"(/\*[\s\S]*?\*/|//[^\n]*|\s+|0[xX][0-9A-Fa-f_]+\b|[+-]?\d[0-9_]*\b|"(?:[^"\\]|\\.)*"|->|[=;:,(){}]|\b[A-Za-z_][A-Za-z0-9_]*\b)"#
    ).unwrap();
    pub static ref SKIPPED_RX: Regex = Regex::new(r"^(//[^\n]*|/\*[\s\S]*\*/|\s+)$").unwrap();
}

#[derive(Debug, PartialEq)]
pub struct Token {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

/// Splits IDL source into tokens, dropping whitespace and comments. The last
/// token is always an empty end-of-input marker.
pub fn tokenize_idl(text: &str) -> Result<Vec<Token>, IdlError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let end   = mat.end();
        let part  = mat.as_str();

        if start > last_end {
            let unexpected = &text[last_end..start];
            return Err(error(
                &format!("Syntax error: {}", quote(unexpected)),
                line,
                column,
            ));
        }

        if !SKIPPED_RX.is_match(part) {
            tokens.push(Token {
                text:   part.to_string(),
                line,
                column,
            });
        }

        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.chars().count() + 1;
            }
        } else {
            column += part.chars().count();
        }

        last_end = end;
    }

    if last_end != text.len() {
        let unexpected = &text[last_end..];
        return Err(error(
            &format!("Syntax error: {}", quote(unexpected)),
            line,
            column,
        ));
    }

    tokens.push(Token {
        text:   "".to_string(),
        line,
        column,
    });
    debug!("tokenized {} tokens over {} lines", tokens.len(), line);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        tokenize_idl(input).unwrap().into_iter().map(|token| token.text).collect()
    }

    #[test]
    fn test_tokenize_simple() {
        let input = "type x = nat;";
        let expected = vec![
            Token { text: "type".into(), line: 1, column: 1 },
            Token { text: "x".into(),    line: 1, column: 6 },
            Token { text: "=".into(),    line: 1, column: 8 },
            Token { text: "nat".into(),  line: 1, column: 10 },
            Token { text: ";".into(),    line: 1, column: 13 },
            Token { text: "".into(),     line: 1, column: 14 },
        ];
        let got = tokenize_idl(input).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_tokenize_comments() {
        let input = "// leading\ntype /* inline\n comment */ T = text;";
        let got = tokenize_idl(input).unwrap();
        assert_eq!(got[0], Token { text: "type".into(), line: 2, column: 1 });
        assert_eq!(got[1], Token { text: "T".into(),    line: 3, column: 13 });
        assert_eq!(got.len(), 6);
    }

    #[test]
    fn test_tokenize_literals() {
        assert_eq!(
            texts(r#"record { 0x1F : nat; -3 : int; "a \"b\"" : text }"#),
            vec!["record", "{", "0x1F", ":", "nat", ";", "-3", ":", "int", ";", r#""a \"b\"""#, ":", "text", "}", ""]
        );
        assert_eq!(texts("func () -> ()"), vec!["func", "(", ")", "->", "(", ")", ""]);
    }

    #[test]
    fn test_tokenize_unexpected_text() {
        for input in ["type x = nat @", "type x = \"open", "/* never closed", "1abc"] {
            let err = tokenize_idl(input).unwrap_err();
            assert!(
                matches!(err, IdlError::ParseError { .. }),
                "expected a ParseError but got {:?}",
                err
            );
        }
    }
}
