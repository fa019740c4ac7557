/// RDF terms and their N-Triples line form
use crate::{FloraError, Result};
use std::fmt;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Literal {
    String(String),
    Integer(i64),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Literal(Literal),
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Term::Literal(Literal::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Term::Literal(Literal::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        Term::Literal(Literal::Boolean(value))
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            Term::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }

    /// Parse one N-Triples statement (without the trailing newline)
    pub fn parse(line: &str) -> Result<Self> {
        let mut cursor = Cursor::new(line);
        let subject = cursor.iri()?;
        let predicate = cursor.iri()?;
        let object = cursor.object()?;
        cursor.expect('.')?;
        cursor.skip_ws();
        if !cursor.rest().is_empty() {
            return Err(cursor.error("trailing characters"));
        }
        Ok(Triple {
            subject,
            predicate,
            object,
        })
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> ", self.subject, self.predicate)?;
        match &self.object {
            Term::Iri(iri) => write!(f, "<{}>", iri)?,
            Term::Literal(Literal::String(s)) => write!(f, "\"{}\"", escape(s))?,
            Term::Literal(Literal::Integer(n)) => write!(f, "\"{}\"^^<{}integer>", n, XSD)?,
            Term::Literal(Literal::Boolean(b)) => write!(f, "\"{}\"^^<{}boolean>", b, XSD)?,
        }
        f.write_str(" .")
    }
}

/// Local name of an IRI: the part after the last `#` or `/`
pub fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

struct Cursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }

    fn error(&self, what: &str) -> FloraError {
        FloraError::Parse(format!(
            "Malformed N-Triples at column {}: {} in {:?}",
            self.pos + 1,
            what,
            self.line
        ))
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.line.len() - trimmed.len();
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn iri(&mut self) -> Result<String> {
        self.expect('<')?;
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| self.error("unterminated IRI"))?;
        let iri = self.rest()[..end].to_string();
        self.pos += end + 1;
        Ok(iri)
    }

    fn object(&mut self) -> Result<Term> {
        self.skip_ws();
        if self.rest().starts_with('<') {
            return Ok(Term::Iri(self.iri()?));
        }
        self.expect('"')?;

        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        let consumed = loop {
            match chars.next() {
                None => return Err(self.error("unterminated literal")),
                Some((i, '"')) => break i + 1,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    _ => return Err(self.error("bad escape")),
                },
                Some((_, c)) => value.push(c),
            }
        };
        self.pos += consumed;

        if self.rest().starts_with("^^") {
            self.pos += 2;
            let datatype = self.iri()?;
            return match datatype.strip_prefix(XSD) {
                Some("integer") | Some("int") | Some("long") => value
                    .parse()
                    .map(Term::integer)
                    .map_err(|_| self.error("invalid integer literal")),
                Some("boolean") => match value.as_str() {
                    "true" | "1" => Ok(Term::boolean(true)),
                    "false" | "0" => Ok(Term::boolean(false)),
                    _ => Err(self.error("invalid boolean literal")),
                },
                _ => Ok(Term::string(value)),
            };
        }
        if self.rest().starts_with('@') {
            let tag_len = self.rest()[1..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
                .unwrap_or(self.rest().len() - 1);
            self.pos += 1 + tag_len;
        }
        Ok(Term::string(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Term::iri("http://rs.tdwg.org/wgsrpd/level1/8"))]
    #[case(Term::string("Picramnia polyantha"))]
    #[case(Term::string("line\nbreak \"quoted\" back\\slash"))]
    #[case(Term::integer(1846))]
    #[case(Term::boolean(false))]
    fn test_line_form_parses_back(#[case] object: Term) {
        let triple = Triple::new("https://example.org/taxon/1", "https://example.org/relation#p", object);
        let line = triple.to_string();
        assert!(!line.contains('\n'));
        assert_eq!(Triple::parse(&line).unwrap(), triple);
    }

    #[test]
    fn test_language_tag_ignored() {
        let triple = Triple::parse("<a> <b> \"Oxalis\"@la .").unwrap();
        assert_eq!(triple.object, Term::string("Oxalis"));
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert!(Triple::parse("<a> <b> <c>").is_err());
        assert!(Triple::parse("<a> <b \"x\" .").is_err());
        assert!(Triple::parse("<a> <b> \"x .").is_err());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("https://biokb.scai.fraunhofer.de/wcvp/relation#hasArea"), "hasArea");
        assert_eq!(local_name("http://rs.tdwg.org/wgsrpd/level3/BZN"), "BZN");
        assert_eq!(local_name(RDF_TYPE), "type");
    }
}
