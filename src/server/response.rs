use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{status_phrase, HttpError, STATUS_CODE_RANGE};

/// How the written objects collapse into one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerializationMode {
    /// One object is emitted unwrapped; zero or several become a list.
    #[default]
    Automatic,
    /// Always a list.
    ForceArray,
    /// All objects merged into one record, later keys winning.
    ForceSingleObject,
    /// The last written object, verbatim, bypassing the formatter.
    Raw,
}

/// One unit passed to [`Response::write`] and friends.
#[derive(Debug, Clone, PartialEq)]
pub enum WrittenObject {
    Data(Value),
    Bytes(Vec<u8>),
}

impl WrittenObject {
    fn to_value(&self) -> Value {
        match self {
            WrittenObject::Data(v) => v.clone(),
            WrittenObject::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            WrittenObject::Data(Value::String(s)) => s.as_bytes().to_vec(),
            WrittenObject::Data(v) => v.to_string().into_bytes(),
            WrittenObject::Bytes(b) => b.clone(),
        }
    }
}

/// Format-neutral result of collapsing a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Handed to the negotiated formatter.
    Structured(Value),
    /// Written to the wire as-is.
    Raw(Vec<u8>),
}

/// Mutable per-request response accumulator.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    phrase: String,
    headers: Vec<(String, String)>,
    objects: Vec<WrittenObject>,
    mode: SerializationMode,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            phrase: status_phrase(200).to_string(),
            headers: Vec::new(),
            objects: Vec::new(),
            mode: SerializationMode::Automatic,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Set the status; the phrase comes from the standard table.
    pub fn set_status(&mut self, code: u16) {
        self.set_status_with_phrase(code, status_phrase(code));
    }

    /// Codes outside 100..=999 cannot be written and are replaced by 500.
    pub fn set_status_with_phrase(&mut self, code: u16, phrase: impl Into<String>) {
        if !STATUS_CODE_RANGE.contains(&code) {
            warn!(status = code, "Unwritable status code replaced by 500");
            self.status = 500;
            self.phrase = status_phrase(500).to_string();
            return;
        }
        self.status = code;
        self.phrase = phrase.into();
    }

    /// Serialize `value` and queue it for output.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        let value = serde_json::to_value(value)?;
        self.objects.push(WrittenObject::Data(value));
        Ok(())
    }

    pub fn write_value(&mut self, value: Value) {
        self.objects.push(WrittenObject::Data(value));
    }

    /// Queue pre-rendered bytes, usually together with [`SerializationMode::Raw`].
    pub fn write_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
        self.objects.push(WrittenObject::Bytes(bytes.into()));
    }

    pub fn objects(&self) -> &[WrittenObject] {
        &self.objects
    }

    pub fn clear_objects(&mut self) {
        self.objects.clear();
    }

    pub fn mode(&self) -> SerializationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SerializationMode) {
        self.mode = mode;
    }

    /// Replace every header called `name` with a single value, keeping the
    /// position of the first occurrence.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(first) => {
                self.headers[first] = (name.clone(), value);
                let mut idx = 0;
                self.headers.retain(|(n, _)| {
                    let keep = idx <= first || !n.eq_ignore_ascii_case(&name);
                    idx += 1;
                    keep
                });
            }
            None => self.headers.push((name, value)),
        }
    }

    /// Add another line for `name`, keeping existing ones.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Collapse the written objects according to the serialization mode.
    pub fn payload(&self) -> Payload {
        match self.mode {
            SerializationMode::Raw => Payload::Raw(
                self.objects
                    .last()
                    .map(WrittenObject::to_bytes)
                    .unwrap_or_default(),
            ),
            SerializationMode::Automatic if self.objects.len() == 1 => {
                Payload::Structured(self.objects[0].to_value())
            }
            SerializationMode::Automatic | SerializationMode::ForceArray => {
                Payload::Structured(Value::Array(self.objects.iter().map(list_item).collect()))
            }
            SerializationMode::ForceSingleObject => {
                let mut merged = Map::new();
                for obj in &self.objects {
                    merge_into(&mut merged, obj.to_value());
                }
                Payload::Structured(Value::Object(merged))
            }
        }
    }
}

/// Records and lists stay as-is inside a list; scalars are wrapped.
fn list_item(obj: &WrittenObject) -> Value {
    match obj.to_value() {
        v @ (Value::Object(_) | Value::Array(_)) => v,
        scalar => Value::Array(vec![scalar]),
    }
}

fn merge_into(target: &mut Map<String, Value>, value: Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                target.insert(k, v);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.into_iter().enumerate() {
                target.insert(i.to_string(), v);
            }
        }
        scalar => {
            target.insert("0".to_string(), scalar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_200_ok() {
        let res = Response::new();
        assert_eq!(res.status(), 200);
        assert_eq!(res.phrase(), "OK");
        assert_eq!(res.mode(), SerializationMode::Automatic);
    }

    #[test]
    fn unwritable_status_falls_back_to_500() {
        let mut res = Response::new();
        res.set_status(42);
        assert_eq!(res.status(), 500);
        assert_eq!(res.phrase(), "Internal Server Error");
        res.set_status_with_phrase(299, "Fine");
        assert_eq!((res.status(), res.phrase()), (299, "Fine"));
    }

    #[test]
    fn automatic_unwraps_single_object() {
        let mut res = Response::new();
        res.write(&json!({"id": 1})).unwrap();
        assert_eq!(res.payload(), Payload::Structured(json!({"id": 1})));

        res.write(&json!({"id": 1})).unwrap();
        assert_eq!(
            res.payload(),
            Payload::Structured(json!([{"id": 1}, {"id": 1}]))
        );
    }

    #[test]
    fn automatic_wraps_scalars_when_listing() {
        let mut res = Response::new();
        res.write_value(json!("a"));
        res.write_value(json!({"b": 2}));
        res.write_value(json!([3]));
        assert_eq!(
            res.payload(),
            Payload::Structured(json!([["a"], {"b": 2}, [3]]))
        );
    }

    #[test]
    fn automatic_with_nothing_written_is_empty_list() {
        assert_eq!(Response::new().payload(), Payload::Structured(json!([])));
    }

    #[test]
    fn force_array_lists_single_object() {
        let mut res = Response::new();
        res.set_mode(SerializationMode::ForceArray);
        res.write_value(json!({"id": 1}));
        assert_eq!(res.payload(), Payload::Structured(json!([{"id": 1}])));
    }

    #[test]
    fn force_single_object_merges_later_wins() {
        let mut res = Response::new();
        res.set_mode(SerializationMode::ForceSingleObject);
        res.write_value(json!({"a": 1, "b": 1}));
        res.write_value(json!({"b": 2}));
        res.write_value(json!("x"));
        assert_eq!(
            res.payload(),
            Payload::Structured(json!({"a": 1, "b": 2, "0": "x"}))
        );
    }

    #[test]
    fn raw_emits_last_item_verbatim() {
        let mut res = Response::new();
        res.set_mode(SerializationMode::Raw);
        res.write_value(json!({"ignored": true}));
        res.write_bytes(b"<html/>".to_vec());
        assert_eq!(res.payload(), Payload::Raw(b"<html/>".to_vec()));

        res.write_value(json!("plain"));
        assert_eq!(res.payload(), Payload::Raw(b"plain".to_vec()));
    }

    #[test]
    fn set_header_replaces_and_append_adds() {
        let mut res = Response::new();
        res.append_header("Set-Cookie", "a=1");
        res.append_header("X-Other", "1");
        res.append_header("set-cookie", "b=2");
        assert_eq!(res.header_values("Set-Cookie").count(), 2);

        res.set_header("SET-COOKIE", "c=3");
        assert_eq!(res.header_values("set-cookie").collect::<Vec<_>>(), vec!["c=3"]);
        assert_eq!(res.headers()[0].1, "c=3");
        assert_eq!(res.headers()[1].0, "X-Other");
    }
}
