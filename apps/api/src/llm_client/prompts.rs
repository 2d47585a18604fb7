// Shared prompt fragments and the template renderer.
// Each feature module keeps its own prompts.rs; only cross-cutting pieces live here.

/// Appended to prompts whose answer is parsed as JSON.
pub const JSON_ONLY_INSTRUCTION: &str = "直接返回JSON，无需其他说明，不要使用markdown代码块。";

/// Fills `{name}` placeholders in a single left-to-right pass.
///
/// Substituted values are never rescanned, so user text containing braces
/// cannot inject further placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match substituted {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Joins items with the Chinese enumeration comma.
pub fn join_cn(items: &[String]) -> String {
    items.join("、")
}

/// Renders items as a `1. …` numbered list, one per line.
pub fn numbered<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}
