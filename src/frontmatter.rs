//! YAML frontmatter parsing and title injection.
//!
//! A block counts only when the file starts with `---` and a closing `---`
//! line follows. Unterminated or unparsable blocks are left as body text.

use serde_yaml::{Mapping, Value};

use crate::errors::{Result, StardocError};
use crate::template::capitalize_words;

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub fields: Option<Mapping>,
    pub body: String,
}

pub fn parse(content: &str) -> Parsed {
    let none = || Parsed {
        fields: None,
        body: content.to_string(),
    };
    if !(content.starts_with("---\n") || content.starts_with("---\r\n")) {
        return none();
    }
    let lines: Vec<&str> = content.split('\n').collect();
    let Some(close) = lines
        .iter()
        .skip(1)
        .position(|l| l.trim() == "---")
        .map(|i| i + 1)
    else {
        return none();
    };
    let yaml = lines[1..close].join("\n");
    let body = lines[close + 1..].join("\n");
    let fields = if yaml.trim().is_empty() {
        Mapping::new()
    } else {
        match serde_yaml::from_str::<Value>(&yaml) {
            Ok(Value::Mapping(m)) => m,
            Ok(Value::Null) => Mapping::new(),
            _ => return none(),
        }
    };
    Parsed {
        fields: Some(fields),
        body,
    }
}

pub fn has_frontmatter(content: &str) -> bool {
    parse(content).fields.is_some()
}

fn has_title(fields: &Mapping) -> bool {
    match fields.get("title") {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Ensure a `title` field, deriving it from `file_name` and `parent_dir`.
/// Existing keys and their order are kept.
pub fn inject(content: &str, file_name: &str, parent_dir: &str) -> Result<String> {
    let Parsed { fields, body } = parse(content);
    let mut fields = fields.unwrap_or_default();
    if !has_title(&fields) {
        let title = Value::String(generate_title(file_name, parent_dir));
        if fields.contains_key("title") {
            fields.insert(Value::from("title"), title);
        } else {
            let mut with_title = Mapping::new();
            with_title.insert(Value::from("title"), title);
            with_title.extend(fields);
            fields = with_title;
        }
    }
    let yaml =
        serde_yaml::to_string(&fields).map_err(|e| StardocError::Frontmatter(e.to_string()))?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

/// Title for a page from its file name. `index`/`README` take the parent
/// directory's name, or `Home` at the root.
pub fn generate_title(file_name: &str, parent_dir: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut name = stem.as_str();
    let parent_base;
    if name == "index" || name.eq_ignore_ascii_case("readme") {
        if parent_dir.is_empty() || parent_dir == "." {
            return "Home".to_string();
        }
        parent_base = std::path::Path::new(parent_dir)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        name = parent_base.as_str();
    }
    let name = strip_order_prefix(name);
    let title = capitalize_words(&name.replace(['-', '_'], " "));
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

/// `01-intro` -> `intro`.
fn strip_order_prefix(s: &str) -> &str {
    let digits = s.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits > 0 && s.as_bytes().get(digits) == Some(&b'-') {
        &s[digits + 1..]
    } else {
        s
    }
}
