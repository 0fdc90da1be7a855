//! Reader for the tag-based schema markup.
//!
//! The grammar lives in `markup.pest`. Parsing yields a plain [`Element`]
//! tree; all schema-level validation happens later in the loader.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{Result, SchemaError};

#[derive(Parser)]
#[grammar = "markup.pest"]
struct MarkupParser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    line: usize,
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Value of the named attribute, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }
    pub fn children(&self) -> &[Element] {
        &self.children
    }
    pub fn children_named<'e>(&'e self, name: &'e str) -> impl Iterator<Item = &'e Element> + 'e {
        self.children.iter().filter(move |c| c.name == name)
    }
    /// Line of the opening tag, starting at 1.
    pub fn line(&self) -> usize {
        self.line
    }
}

/// Parses a whole document and returns its root element.
pub fn parse(text: &str) -> Result<Element> {
    let document = MarkupParser::parse(Rule::document, text)?
        .next()
        .ok_or_else(|| SchemaError::Parse {
            message: "empty document".into(),
            line: None,
            col: None,
        })?;
    document
        .into_inner()
        .find(|pair| pair.as_rule() == Rule::element)
        .map(build)
        .unwrap_or_else(|| {
            Err(SchemaError::Parse {
                message: "document has no root element".into(),
                line: None,
                col: None,
            })
        })
}

fn build(pair: Pair<Rule>) -> Result<Element> {
    let (line, col) = pair.line_col();
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let mut element = Element {
        name,
        attributes: Vec::new(),
        children: Vec::new(),
        line,
    };
    for part in inner {
        match part.as_rule() {
            Rule::attribute => {
                let mut kv = part.into_inner();
                let key = kv.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                let raw = kv
                    .next()
                    .and_then(|value| value.into_inner().next())
                    .map(|p| p.as_str())
                    .unwrap_or("");
                if element.attribute(&key).is_some() {
                    return Err(SchemaError::Parse {
                        message: format!("duplicate attribute \"{}\" in <{}>", key, element.name),
                        line: Some(line),
                        col: Some(col),
                    });
                }
                element.attributes.push((key, unescape(raw)));
            }
            Rule::element => element.children.push(build(part)?),
            Rule::name => {
                if part.as_str() != element.name {
                    let (close_line, close_col) = part.line_col();
                    return Err(SchemaError::Parse {
                        message: format!(
                            "closing tag </{}> does not match <{}> opened on line {}",
                            part.as_str(),
                            element.name,
                            line
                        ),
                        line: Some(close_line),
                        col: Some(close_col),
                    });
                }
            }
            _ => (),
        }
    }
    Ok(element)
}

// Decodes the five predefined entities and decimal or hex character
// references. Anything else after an ampersand is kept as written.
fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        let decoded = tail
            .find(';')
            .and_then(|end| entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.strip_prefix('#')?.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_elements_and_attributes() {
        let root = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <!-- leading comment -->
            <domain name="cars">
              <entities>
                <entity name="Car" description='A &quot;car&quot; &amp; more'/>
              </entities>
              <relationships></relationships>
            </domain>"#,
        )
        .unwrap();
        assert_eq!(root.name(), "domain");
        assert_eq!(root.attribute("name"), Some("cars"));
        assert_eq!(root.children().len(), 2);
        let car = &root.children()[0].children()[0];
        assert_eq!(car.attribute("description"), Some("A \"car\" & more"));
        assert_eq!(car.line(), 5);
    }

    #[test]
    fn decodes_character_references() {
        let root = parse(r#"<a x="&#38; &#x26;&#X3C;" y="fish &amp;chips; &bogus; &#xZZ; 5 & 6"/>"#).unwrap();
        assert_eq!(root.attribute("x"), Some("& &<"));
        assert_eq!(root.attribute("y"), Some("fish &chips; &bogus; &#xZZ; 5 & 6"));
        assert_eq!(unescape("&amp;lt;"), "&lt;");
    }

    #[test]
    fn ignores_text_and_inner_comments() {
        let root = parse("<a>hello <!-- x --> <b/> world</a>").unwrap();
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].name(), "b");
    }

    #[test]
    fn rejects_mismatched_closing_tag() {
        let err = parse("<a><b></c></a>").unwrap_err();
        match err {
            SchemaError::Parse { message, line, .. } => {
                assert!(message.contains("</c>"));
                assert_eq!(line, Some(1));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_attribute() {
        assert!(matches!(
            parse(r#"<a name="x" name="y"/>"#),
            Err(SchemaError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_unterminated_document() {
        assert!(matches!(parse("<a><b/>"), Err(SchemaError::Parse { .. })));
    }
}
