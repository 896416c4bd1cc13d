use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

// Object alternatives: IRI, complete literal, then anything else so unsupported
// terms still reach `parse_object`. A comment may follow the final dot.
static TRIPLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^<([^>]+)>\s+<([^>]+)>\s+(<[^>]*>|"(?:[^"\\]|\\.)*"(?:\^\^<[^>]+>|@[A-Za-z]+(?:-[A-Za-z0-9]+)*)?|.+?)\s*\.\s*(?:#.*)?$"#,
    )
    .unwrap()
});

static LITERAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"((?:[^"\\]|\\.)*)"(?:\^\^<([^>]+)>|@([a-zA-Z]+(?:-[a-zA-Z0-9]+)*))?$"#).unwrap()
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("line does not match `<subject> <predicate> object .`")]
    Shape,
    #[error("unsupported object term: {0}")]
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    /// Lexical form exactly as written between the quotes
    pub value: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Uri(String),
    Literal(Literal),
}

impl Object {
    pub fn is_uri(&self) -> bool {
        matches!(self, Object::Uri(_))
    }

    /// IRI for URI objects, the literal's value otherwise.
    pub fn lexical(&self) -> &str {
        match self {
            Object::Uri(uri) => uri,
            Object::Literal(lit) => &lit.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Object,
}

/// Parses one trimmed, non-comment N-Triples line.
pub fn parse_line(line: &str) -> Result<Triple, ParseFailure> {
    let caps = TRIPLE_REGEX.captures(line).ok_or(ParseFailure::Shape)?;
    let object = parse_object(&caps[3])?;
    Ok(Triple {
        subject: caps[1].to_string(),
        predicate: caps[2].to_string(),
        object,
    })
}

fn parse_object(term: &str) -> Result<Object, ParseFailure> {
    if let Some(uri) = term.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        if uri.is_empty() || uri.contains(['<', '>']) {
            return Err(ParseFailure::Object(term.to_string()));
        }
        return Ok(Object::Uri(uri.to_string()));
    }

    let caps = LITERAL_REGEX
        .captures(term)
        .ok_or_else(|| ParseFailure::Object(term.to_string()))?;
    Ok(Object::Literal(Literal {
        value: caps[1].to_string(),
        datatype: caps.get(2).map(|m| m.as_str().to_string()),
        language: caps.get(3).map(|m| m.as_str().to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_object() {
        let t = parse_line("<http://ex/u1> <http://ex/type> <http://schema/User> .").unwrap();
        assert_eq!(t.subject, "http://ex/u1");
        assert_eq!(t.predicate, "http://ex/type");
        assert_eq!(t.object, Object::Uri("http://schema/User".into()));
        assert!(t.object.is_uri());
    }

    #[test]
    fn plain_literal() {
        let t = parse_line(r#"<http://ex/u1> <http://ex/name> "Alice" ."#).unwrap();
        assert_eq!(
            t.object,
            Object::Literal(Literal {
                value: "Alice".into(),
                datatype: None,
                language: None,
            })
        );
        assert_eq!(t.object.lexical(), "Alice");
    }

    #[test]
    fn typed_literal() {
        let t = parse_line(
            r#"<http://ex/p> <http://ex/price> "9.99"^^<http://www.w3.org/2001/XMLSchema#decimal> ."#,
        )
        .unwrap();
        match t.object {
            Object::Literal(lit) => {
                assert_eq!(lit.value, "9.99");
                assert_eq!(
                    lit.datatype.as_deref(),
                    Some("http://www.w3.org/2001/XMLSchema#decimal")
                );
                assert_eq!(lit.language, None);
            }
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn language_literal() {
        let t = parse_line(r#"<http://ex/p> <http://ex/label> "运动鞋"@zh-CN ."#).unwrap();
        match t.object {
            Object::Literal(lit) => {
                assert_eq!(lit.value, "运动鞋");
                assert_eq!(lit.language.as_deref(), Some("zh-CN"));
            }
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn literal_with_spaces_and_dot() {
        let t = parse_line(r#"<http://ex/p> <http://ex/desc> "Made in Italy. Since 1920." ."#)
            .unwrap();
        assert_eq!(t.object.lexical(), "Made in Italy. Since 1920.");
    }

    #[test]
    fn escaped_quote_kept_verbatim() {
        let t = parse_line(r#"<http://ex/p> <http://ex/desc> "say \"hi\"" ."#).unwrap();
        assert_eq!(t.object.lexical(), r#"say \"hi\""#);
    }

    #[test]
    fn no_space_before_dot() {
        let t = parse_line("<http://ex/a> <http://ex/b> <http://ex/c>.").unwrap();
        assert_eq!(t.object, Object::Uri("http://ex/c".into()));
    }

    #[test]
    fn trailing_comment_after_dot() {
        let t = parse_line("<http://ex/a> <http://ex/type> <http://schema/User> . # note").unwrap();
        assert_eq!(t.object, Object::Uri("http://schema/User".into()));

        let t = parse_line(r#"<http://ex/a> <http://ex/name> "Alice"@en .# imported"#).unwrap();
        assert_eq!(t.object.lexical(), "Alice");
    }

    #[test]
    fn literal_containing_dot_hash_is_kept_whole() {
        let t = parse_line(r#"<http://ex/p> <http://ex/desc> "Size 9. # best seller" ."#).unwrap();
        assert_eq!(t.object.lexical(), "Size 9. # best seller");

        let t = parse_line(r#"<http://ex/p> <http://ex/desc> "a . # b" . # c"#).unwrap();
        assert_eq!(t.object.lexical(), "a . # b");
    }

    #[test]
    fn missing_dot_is_shape_failure() {
        assert_eq!(
            parse_line("<http://ex/a> <http://ex/b> <http://ex/c>"),
            Err(ParseFailure::Shape)
        );
    }

    #[test]
    fn garbage_is_shape_failure() {
        assert_eq!(parse_line("not a triple"), Err(ParseFailure::Shape));
        assert_eq!(parse_line("<http://ex/a> <http://ex/b> ."), Err(ParseFailure::Shape));
    }

    #[test]
    fn blank_node_object_unsupported() {
        assert!(matches!(
            parse_line("<http://ex/a> <http://ex/b> _:b0 ."),
            Err(ParseFailure::Object(_))
        ));
    }

    #[test]
    fn unterminated_literal_unsupported() {
        assert!(matches!(
            parse_line(r#"<http://ex/a> <http://ex/b> "open ."#),
            Err(ParseFailure::Object(_))
        ));
    }
}
