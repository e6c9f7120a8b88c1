//! Manifest file parsing and identity.
//!
//! Third-party buckets are not validated by anyone, so parsing is tolerant:
//! `//` and `/* */` comments and trailing commas are stripped before deserialising, and
//! `license`, `description`, `version` and `homepage` accept the shapes seen in the wild.
//! A field of an unrecognised shape is dropped; the rest of the manifest is kept.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ManifestError;
use crate::model::{CrawledManifest, CrawledMetadata};

/// Stable identifier of a manifest slot: independent of content.
pub fn manifest_id(repository: &str, branch_name: &str, file_path: &str) -> String {
    let key = format!("{}#{}#{}", repository.to_lowercase(), branch_name, file_path);
    sha256_hex(key.as_bytes())
}

/// Hash of the raw manifest bytes, used to detect mirrored manifests.
pub fn content_hash(content: &[u8]) -> String {
    sha256_hex(content)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Package name derived from the file name without its extension.
pub fn manifest_name(file_path: &str) -> Option<&str> {
    let file_name = file_path.rsplit('/').next()?;
    let name = match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(dot) => &file_name[..dot],
    };
    (!name.is_empty()).then_some(name)
}

/// Parse one manifest file into a [`CrawledManifest`].
pub fn parse_manifest(
    content: &[u8],
    metadata: CrawledMetadata,
) -> Result<CrawledManifest, ManifestError> {
    let name = manifest_name(&metadata.file_path)
        .ok_or_else(|| ManifestError::InvalidPath(metadata.file_path.clone()))?
        .to_string();

    let text = std::str::from_utf8(content).map_err(|_| ManifestError::Encoding)?;
    let Value::Object(document) = serde_json::from_str::<Value>(&strip_json_noise(text))? else {
        return Err(ManifestError::NotAnObject);
    };

    Ok(CrawledManifest {
        id: manifest_id(
            &metadata.repository,
            &metadata.branch_name,
            &metadata.file_path,
        ),
        name,
        description: field(&document, "description", description_text),
        homepage: field(&document, "homepage", lenient_string),
        license: field(&document, "license", license_text),
        version: field(&document, "version", lenient_string),
        metadata,
    })
}

/// Remove a leading BOM, comments and trailing commas outside of string literals.
pub fn strip_json_noise(text: &str) -> String {
    let text = text.trim_start_matches('\u{feff}');
    let without_comments = strip_comments(text);
    strip_trailing_commas(&without_comments)
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn field(
    document: &Map<String, Value>,
    key: &str,
    read: fn(&Value) -> Option<String>,
) -> Option<String> {
    document.get(key).and_then(read)
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn description_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(lines) => {
            let lines: Vec<&str> = lines.iter().filter_map(Value::as_str).collect();
            (!lines.is_empty()).then(|| join_description_lines(&lines))
        }
        _ => None,
    }
}

/// Lines are joined with a space; an empty line is a paragraph break.
fn join_description_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        if line.is_empty() {
            out.push('\n');
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

/// A string, an `{identifier, url}` object or a list of either.
fn license_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(license) => license
            .get("identifier")
            .and_then(Value::as_str)
            .or_else(|| license.get("url").and_then(Value::as_str))
            .map(str::to_string),
        Value::Array(values) => {
            let parts: Vec<String> = values.iter().filter_map(license_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn metadata(file_path: &str) -> CrawledMetadata {
        CrawledMetadata {
            repository: "https://github.com/foo/bar".into(),
            branch_name: "master".into(),
            file_path: file_path.into(),
            committed: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
            sha: "sha".into(),
            manifest_hash: "hash".into(),
        }
    }

    fn parse(json: &str) -> CrawledManifest {
        parse_manifest(json.as_bytes(), metadata("bucket/Foo.json")).expect("manifest should parse")
    }

    #[test]
    fn description_shapes() {
        struct TestCase {
            name: &'static str,
            json: &'static str,
            expected: Option<&'static str>,
        }

        let cases = vec![
            TestCase {
                name: "string",
                json: r#"{"description": "foo"}"#,
                expected: Some("foo"),
            },
            TestCase {
                name: "array with paragraph break",
                json: r#"{"description": ["foo", "", "bar"]}"#,
                expected: Some("foo\nbar"),
            },
            TestCase {
                name: "array joined with spaces",
                json: r#"{"description": ["foo", "bar"]}"#,
                expected: Some("foo bar"),
            },
            TestCase {
                name: "non-string lines are skipped",
                json: r#"{"description": ["a", null, 3, "b"]}"#,
                expected: Some("a b"),
            },
            TestCase {
                name: "number is dropped",
                json: r#"{"description": 5}"#,
                expected: None,
            },
            TestCase {
                name: "missing",
                json: r#"{"version": "1.0"}"#,
                expected: None,
            },
        ];

        for tc in cases {
            assert_eq!(parse(tc.json).description.as_deref(), tc.expected, "{}", tc.name);
        }
    }

    #[test]
    fn license_shapes() {
        struct TestCase {
            name: &'static str,
            json: &'static str,
            expected: Option<&'static str>,
        }

        let cases = vec![
            TestCase {
                name: "string",
                json: r#"{"license": "MIT"}"#,
                expected: Some("MIT"),
            },
            TestCase {
                name: "object prefers identifier",
                json: r#"{"license": {"identifier": "foo", "url": "bar"}}"#,
                expected: Some("foo"),
            },
            TestCase {
                name: "object falls back to url",
                json: r#"{"license": {"url": "bar"}}"#,
                expected: Some("bar"),
            },
            TestCase {
                name: "array of objects",
                json: r#"{"license": [{"identifier": "foo"}, {"url": "bar"}]}"#,
                expected: Some("foo, bar"),
            },
            TestCase {
                name: "array of mixed",
                json: r#"{"license": ["GPL-3.0", {"identifier": "MIT"}]}"#,
                expected: Some("GPL-3.0, MIT"),
            },
            TestCase {
                name: "null entries are skipped",
                json: r#"{"license": ["MIT", null]}"#,
                expected: Some("MIT"),
            },
            TestCase {
                name: "unrecognised shape is dropped",
                json: r#"{"license": true}"#,
                expected: None,
            },
            TestCase {
                name: "missing",
                json: r#"{}"#,
                expected: None,
            },
        ];

        for tc in cases {
            assert_eq!(parse(tc.json).license.as_deref(), tc.expected, "{}", tc.name);
        }
    }

    #[test]
    fn tolerates_comments_and_trailing_commas() {
        let json = "\u{feff}{\n  // a comment\n  \"version\": \"1.2\", /* block */\n  \"homepage\": \"https://example.org//path\",\n  \"bin\": [\"a.exe\",],\n}";
        let manifest = parse(json);
        assert_eq!(manifest.version.as_deref(), Some("1.2"));
        assert_eq!(manifest.homepage.as_deref(), Some("https://example.org//path"));
    }

    #[test]
    fn numeric_version_is_stringified() {
        assert_eq!(parse(r#"{"version": 7}"#).version.as_deref(), Some("7"));
    }

    #[test]
    fn bad_field_shape_keeps_the_rest() {
        let manifest = parse(r#"{"version": "2.0", "description": 5, "license": ["MIT", null]}"#);
        assert_eq!(manifest.version.as_deref(), Some("2.0"));
        assert_eq!(manifest.description, None);
        assert_eq!(manifest.license.as_deref(), Some("MIT"));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        for json in ["[]", r#"["1"]"#, "\"1.0\"", "42", "null"] {
            let result = parse_manifest(json.as_bytes(), metadata("bucket/Foo.json"));
            assert!(matches!(result, Err(ManifestError::NotAnObject)), "{json}");
        }
    }

    #[test]
    fn invalid_json_is_an_error() {
        let result = parse_manifest(b"{ not json", metadata("bucket/Foo.json"));
        assert!(matches!(result, Err(ManifestError::Json(_))));
    }

    #[test]
    fn name_comes_from_file_name() {
        let manifest = parse("{}");
        assert_eq!(manifest.name, "Foo");
        assert_eq!(manifest_name("a.b.json"), Some("a.b"));
        assert_eq!(manifest_name("dir/x.JSON"), Some("x"));
    }

    #[test]
    fn id_is_independent_of_content() {
        let a = parse(r#"{"version": "1"}"#);
        let b = parse(r#"{"version": "2"}"#);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, manifest_id("https://GITHUB.com/foo/bar", "master", "bucket/Foo.json"));
        assert_ne!(a.id, manifest_id("https://github.com/foo/bar", "main", "bucket/Foo.json"));
        assert_ne!(content_hash(b"1"), content_hash(b"2"));
    }
}
