use serde_json::Value;

/// Values decoded from one file, plus the number of fragments that failed.
#[derive(Debug, Default, PartialEq)]
pub struct Decoded {
    pub values: Vec<Value>,
    pub malformed: usize,
}

/// Decode a JSON file that is either a single document (an object, or an
/// array of objects) or newline-delimited JSON.
pub fn decode_json(bytes: &[u8]) -> Decoded {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return match value {
            Value::Array(items) => Decoded {
                values: items,
                malformed: 0,
            },
            other => Decoded {
                values: vec![other],
                malformed: 0,
            },
        };
    }

    let mut decoded = Decoded::default();
    for line in bytes.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(value) => decoded.values.push(value),
            Err(_) => decoded.malformed += 1,
        }
    }
    decoded
}
