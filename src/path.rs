//! Path template handling.
//!
//! Routes may be declared with either `:name` or `{name}` placeholders. Both
//! axum 0.8 and OpenAPI want the braced form, so everything is normalized here.

/// Normalize a path template to the braced placeholder form.
///
/// ```ignore
/// assert_eq!(normalize("users/:id/"), "/users/{id}");
/// ```
pub fn normalize(template: &str) -> String {
    let segments: Vec<String> = template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect();

    format!("/{}", segments.join("/"))
}

/// Placeholder names of a path template, in declaration order.
pub fn params(template: &str) -> Vec<String> {
    normalize(template)
        .split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(|name| name.trim_start_matches('*').to_string())
        })
        .collect()
}

/// Join a group prefix and a route path.
pub fn join(prefix: &str, path: &str) -> String {
    let prefix = normalize(prefix);
    let path = normalize(path);
    match (prefix.as_str(), path.as_str()) {
        ("/", _) => path,
        (_, "/") => prefix,
        _ => format!("{prefix}{path}"),
    }
}

/// Whether two normalized templates put differently named placeholders at
/// the same position after an identical prefix, which axum's router rejects.
///
/// `/users/{id}` and `/users/{user_id}/posts` clash; `/users/{id}` and
/// `/users/me` do not.
pub fn placeholders_clash(a: &str, b: &str) -> bool {
    for (left, right) in a.split('/').zip(b.split('/')) {
        match (placeholder(left), placeholder(right)) {
            (Some(x), Some(y)) if x != y => return true,
            (Some(_), Some(_)) => {}
            _ if left == right => {}
            _ => return false,
        }
    }
    false
}

fn placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

/// Default operation id: `<method>_<segments>`, placeholders unwrapped.
pub(crate) fn operation_id(method: &str, template: &str) -> String {
    let slug: Vec<String> = normalize(template)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .trim_matches(|c| c == '{' || c == '}' || c == '*')
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect()
        })
        .collect();

    if slug.is_empty() {
        format!("{}_root", method.to_lowercase())
    } else {
        format!("{}_{}", method.to_lowercase(), slug.join("_"))
    }
}
