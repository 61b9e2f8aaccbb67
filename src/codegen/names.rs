//! Rust identifier rendering
//!
//! Schema identifiers are already `[A-Za-z_][A-Za-z0-9_]*`, so the only work
//! left is casing and keyword handling. Keywords become raw identifiers,
//! except the four that Rust refuses even in raw form.

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "static", "struct",
    "trait", "true", "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "gen",
    "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Not expressible as identifiers at all (`r#self` is rejected by rustc)
const FORBIDDEN: &[&str] = &["Self", "self", "super", "crate", "_"];

/// Escape `name` for use as a Rust identifier
pub fn escape(name: &str) -> Result<String, String> {
    if FORBIDDEN.contains(&name) {
        return Err(format!("'{}' cannot be used as a Rust identifier", name));
    }
    if RUST_KEYWORDS.contains(&name) {
        Ok(format!("r#{}", name))
    } else {
        Ok(name.to_string())
    }
}

/// Type, trait and variant names keep their declared spelling
pub fn type_ident(name: &str) -> Result<String, String> {
    escape(name)
}

pub fn field_ident(name: &str) -> Result<String, String> {
    escape(&to_snake_case(name))
}

/// Module a schema's generated code lives in
pub fn module_ident(schema_name: &str) -> Result<String, String> {
    escape(&to_snake_case(schema_name))
}

/// Convert to snake_case; acronym runs stay together (`HTTPServer` -> `http_server`)
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !result.ends_with('_') {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}
