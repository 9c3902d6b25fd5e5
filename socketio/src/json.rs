use crate::{Error, Result};

/// Splits a json array into the raw text of its top-level elements, e.g.
/// `["messages",[{},{}]]` into `"messages"` and `[{},{}]`.
///
/// Only commas outside of nested objects, arrays and strings separate
/// elements. The elements themselves are not validated.
pub fn split_json_array(text: &str) -> Result<Vec<&str>> {
    let invalid = || Error::InvalidJsonArray(text.to_owned());
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(invalid)?;

    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => (),
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.checked_sub(1).ok_or_else(invalid)?,
            ',' if depth == 0 => {
                elements.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }

    if in_string || depth != 0 {
        return Err(invalid());
    }

    let last = inner[start..].trim();
    if !last.is_empty() || !elements.is_empty() {
        elements.push(last);
    }
    Ok(elements)
}

/// Like [`split_json_array`], with one pair of surrounding quotes removed
/// from each element, so `["message","value"]` yields `message` and `value`.
pub fn json_array_values(text: &str) -> Result<Vec<String>> {
    Ok(split_json_array(text)?
        .into_iter()
        .map(|element| unquote(element).to_owned())
        .collect())
}

pub(crate) fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_json_array_values() {
        assert_eq!(
            json_array_values("[\"messages\",[{},{},{}]]").unwrap(),
            vec!["messages", "[{},{},{}]"]
        );
        assert_eq!(
            json_array_values("[\"message\",\"value\"]").unwrap(),
            vec!["message", "value"]
        );
        assert_eq!(json_array_values("[\"message\"]").unwrap(), vec!["message"]);
        assert_eq!(
            json_array_values("[\"message\",{}]").unwrap(),
            vec!["message", "{}"]
        );
        assert_eq!(
            json_array_values("[\"new message\",{\"username\":\"1\",\"message\":\"1\"}]").unwrap(),
            vec!["new message", "{\"username\":\"1\",\"message\":\"1\"}"]
        );
    }

    #[test]
    fn test_split_keeps_raw_elements() {
        assert_eq!(
            split_json_array("[\"message\", \"value\" , 42]").unwrap(),
            vec!["\"message\"", "\"value\"", "42"]
        );
        assert!(split_json_array("[]").unwrap().is_empty());
    }

    #[test]
    fn test_strings_do_not_split() {
        assert_eq!(
            json_array_values("[\"message\",\"a, [b] {c}\"]").unwrap(),
            vec!["message", "a, [b] {c}"]
        );
        assert_eq!(
            split_json_array("[\"m\",{\"text\":\"say \\\"hi\\\", ok }\"}]").unwrap(),
            vec!["\"m\"", "{\"text\":\"say \\\"hi\\\", ok }\"}"]
        );
    }

    #[test]
    fn test_invalid_arrays() {
        for invalid in ["", "\"message\"", "{\"a\":1}", "[\"a\",{]", "[\"a]", "[}{]"] {
            assert!(
                matches!(split_json_array(invalid), Err(Error::InvalidJsonArray(_))),
                "{} should not split",
                invalid
            );
        }
    }
}
