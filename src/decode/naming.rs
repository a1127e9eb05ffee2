//! Field identifier to environment key conversion.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Lower,
    Upper,
    Digit,
    Separator,
}

impl Class {
    fn of(c: char) -> Self {
        if c.is_lowercase() {
            Class::Lower
        } else if c.is_uppercase() {
            Class::Upper
        } else if c.is_numeric() {
            Class::Digit
        } else {
            Class::Separator
        }
    }

    fn is_letter(self) -> bool {
        matches!(self, Class::Lower | Class::Upper)
    }
}

/// Derives an upper snake case key from an identifier.
///
/// Runs of anything that is not a letter or digit collapse into a single `_`, and a
/// word break is inserted at `fooBar`, `HTTPServer` (before `Server`), `foo1` and
/// `1foo`. Leading and trailing separators are dropped.
///
/// ```rust
/// use app_bootstrap::decode::to_env_name;
///
/// assert_eq!(to_env_name("http_port"), "HTTP_PORT");
/// assert_eq!(to_env_name("HTTPServer"), "HTTP_SERVER");
/// ```
pub fn to_env_name(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);
    let mut prev = Class::Separator;

    for (i, &c) in chars.iter().enumerate() {
        let class = Class::of(c);
        if class == Class::Separator {
            if !out.is_empty() && prev != Class::Separator {
                out.push('_');
                prev = Class::Separator;
            }
            continue;
        }

        let next_lower = class == Class::Upper
            && chars.get(i + 1).is_some_and(|next| next.is_lowercase());

        let boundary = !out.is_empty()
            && prev != Class::Separator
            && ((prev == Class::Lower && class == Class::Upper)
                || (prev == Class::Upper && class == Class::Upper && next_lower)
                || (prev.is_letter() && class == Class::Digit)
                || (prev == Class::Digit && class.is_letter()));
        if boundary {
            out.push('_');
        }

        out.extend(c.to_uppercase());
        prev = class;
    }

    if out.ends_with('_') {
        out.pop();
    }
    out
}
