//! `${name}` token substitution for templated files

/// Replace every `${name}` with `lookup(name)`; unknown names become empty
///
/// An unterminated `${` is copied through unchanged.
pub fn render<F>(source: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = lookup(name) {
                    out.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tokens() {
        let lookup = |name: &str| match name {
            "user" => Some("alice".to_string()),
            "count" => Some("3".to_string()),
            _ => None,
        };
        assert_eq!(render("Hi ${user}, ${count} new", lookup), "Hi alice, 3 new");
        assert_eq!(render("${missing}!", lookup), "!");
        assert_eq!(render("cost: $5 ${ user }", lookup), "cost: $5 alice");
        assert_eq!(render("open ${user", lookup), "open ${user");
    }
}
