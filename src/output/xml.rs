use std::fmt::Display;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlWriter;
use serde_json::Value;

use super::{error_envelope, OutputProcessor};
use crate::error::{HttpError, OutputError};

/// `application/xml` output.
///
/// Payloads are wrapped in `<response>`, error envelopes in `<error>`. Record
/// keys become element names; keys that are not valid XML names are written
/// as `<entry key="...">`. List items are written as `<item>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlProcessor;

fn xml_err(err: impl Display) -> OutputError {
    OutputError::Xml(err.to_string())
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.to_ascii_lowercase().starts_with("xml")
}

fn write_element(
    writer: &mut XmlWriter<Vec<u8>>,
    name: &str,
    key: Option<&str>,
    value: &Value,
) -> Result<(), OutputError> {
    let mut start = BytesStart::new(name);
    if let Some(key) = key {
        start.push_attribute(("key", key));
    }
    if value.is_null() {
        return writer.write_event(Event::Empty(start)).map_err(xml_err);
    }

    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                if is_xml_name(child_key) {
                    write_element(writer, child_key, None, child)?;
                } else {
                    write_element(writer, "entry", Some(child_key), child)?;
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                write_element(writer, "item", None, item)?;
            }
        }
        Value::String(s) => {
            writer
                .write_event(Event::Text(BytesText::new(s)))
                .map_err(xml_err)?;
        }
        scalar => {
            let text = scalar.to_string();
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_err)?;
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

impl XmlProcessor {
    fn document(&self, root: &str, value: &Value) -> Result<Vec<u8>, OutputError> {
        let mut writer = XmlWriter::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        write_element(&mut writer, root, None, value)?;
        Ok(writer.into_inner())
    }
}

impl OutputProcessor for XmlProcessor {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn content_type(&self) -> &'static str {
        "application/xml"
    }

    fn format(&self, payload: &Value) -> Result<Vec<u8>, OutputError> {
        self.document("response", payload)
    }

    fn format_error(&self, error: &HttpError, include_trace: bool) -> Result<Vec<u8>, OutputError> {
        self.document("error", &error_envelope(error, include_trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(value: Value) -> String {
        String::from_utf8(XmlProcessor.format(&value).unwrap()).unwrap()
    }

    #[test]
    fn renders_records_and_lists() {
        let xml = render(json!({"id": "42", "tags": ["a", "b"], "note": null}));
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <response><id>42</id><tags><item>a</item><item>b</item></tags><note/></response>"
        );
    }

    #[test]
    fn escapes_text_and_odd_keys() {
        let xml = render(json!({"0": "a<b", "ok": 1}));
        assert!(xml.contains("<entry key=\"0\">a&lt;b</entry>"));
        assert!(xml.contains("<ok>1</ok>"));
    }

    #[test]
    fn errors_use_error_root() {
        let err = HttpError::not_found("no such pet");
        let xml = String::from_utf8(XmlProcessor.format_error(&err, false).unwrap()).unwrap();
        assert!(xml.contains("<error><type>Not Found</type><code>404</code>"));
        assert!(xml.contains("<message>no such pet</message></error>"));
    }
}
