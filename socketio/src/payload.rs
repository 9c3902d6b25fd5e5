use serde_json::Value;

/// The optional argument of an emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// Sent as a quoted string exactly as given, without json escaping.
    Text(String),
    Json(Value),
}

impl Payload {
    /// The data of an event packet: `["event"]`, `["event","text"]` or
    /// `["event",<json>]`.
    pub(crate) fn event_data(&self, event: &str) -> String {
        match self {
            Payload::Empty => format!("[\"{}\"]", event),
            Payload::Text(text) => format!("[\"{}\",\"{}\"]", event, text),
            Payload::Json(value) => format!("[\"{}\",{}]", event, value),
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_data() {
        assert_eq!(Payload::from(()).event_data("ping"), "[\"ping\"]");
        assert_eq!(
            Payload::from("hello").event_data("message"),
            "[\"message\",\"hello\"]"
        );
        assert_eq!(
            Payload::from(json!({"username": "u", "message": "m"})).event_data("new message"),
            "[\"new message\",{\"message\":\"m\",\"username\":\"u\"}]"
        );
        assert_eq!(
            Payload::from(json!([1, 2])).event_data("numbers"),
            "[\"numbers\",[1,2]]"
        );
        assert_eq!(Payload::from(None::<String>), Payload::Empty);
    }
}
