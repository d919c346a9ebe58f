//! check/kv — как показывать ключи/значения в сообщениях об ошибках.

/// Renders keys and values for check error messages.
pub trait KvStringer {
    fn key_to_string(&self, key: &[u8]) -> String;
    fn value_to_string(&self, value: &[u8]) -> String;
}

/// Always lowercase hex. Default for library callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexKvStringer;

impl KvStringer for HexKvStringer {
    fn key_to_string(&self, key: &[u8]) -> String {
        to_hex(key)
    }

    fn value_to_string(&self, value: &[u8]) -> String {
        to_hex(value)
    }
}

/// Printable UTF-8 as-is, anything else as hex. Used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadableKvStringer;

impl KvStringer for ReadableKvStringer {
    fn key_to_string(&self, key: &[u8]) -> String {
        text_or_hex(key)
    }

    fn value_to_string(&self, value: &[u8]) -> String {
        text_or_hex(value)
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn text_or_hex(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.is_empty() && !s.chars().any(char::is_control) => s.to_string(),
        _ => to_hex(bytes),
    }
}
