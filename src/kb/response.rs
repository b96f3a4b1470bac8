//! Parsing of decorated knowledge-base answers.
//!
//! Individuals come back as full IRIs, `<http://bnc/exp-rob-lab/2022-23#R1>`, and
//! data values as typed literals, `"1665579740"^^xsd:long`. The functions here pull
//! out the bare name and the literal payload. Any other shape is a protocol change
//! and is reported as [`KbError::Malformed`].

use crate::error::KbError;

/// Strips the namespace and angle brackets from an individual IRI.
///
/// `<http://bnc/exp-rob-lab/2022-23#R1>` becomes `R1`.
pub fn parse_individual(raw: &str) -> Result<String, KbError> {
    let malformed = || KbError::Malformed {
        raw: raw.to_string(),
        expected: "<namespace#name>",
    };
    let inner = raw
        .trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(malformed)?;
    let (_, name) = inner.rsplit_once('#').ok_or_else(malformed)?;
    if name.is_empty() {
        return Err(malformed());
    }
    Ok(name.to_string())
}

/// Extracts the quoted payload of a typed literal.
///
/// `"1665579740"^^xsd:long` becomes `1665579740`.
pub fn parse_literal(raw: &str) -> Result<String, KbError> {
    let rest = raw.trim().strip_prefix('"').ok_or_else(|| KbError::Malformed {
        raw: raw.to_string(),
        expected: "\"value\"^^type",
    })?;
    let (value, _datatype) = rest.split_once('"').ok_or_else(|| KbError::Malformed {
        raw: raw.to_string(),
        expected: "\"value\"^^type",
    })?;
    Ok(value.to_string())
}

/// A literal holding unix epoch seconds.
pub fn parse_timestamp(raw: &str) -> Result<i64, KbError> {
    parse_literal(raw)?
        .parse::<i64>()
        .map_err(|_| KbError::Malformed {
            raw: raw.to_string(),
            expected: "integer timestamp literal",
        })
}

/// Decorates an individual name the way the service does.
pub fn format_individual(iri: &str, name: &str) -> String {
    format!("<{iri}#{name}>")
}

/// Decorates a literal the way the service does.
pub fn format_literal(value: &str, datatype: &str) -> String {
    let xsd = match datatype.to_ascii_lowercase().as_str() {
        "long" => "long",
        "int" | "integer" => "integer",
        "boolean" => "boolean",
        "float" => "float",
        _ => "string",
    };
    format!("\"{value}\"^^xsd:{xsd}")
}
