//! Inline plan parser used when the planner is silent on its first turn.
//!
//! A goal may carry its own plan as `tool: arguments` lines:
//!
//! ```text
//! Tidy the downloads folder
//! - fs.listdir: ~/Downloads
//! - fs.move: src=~/Downloads/a.pdf dst="~/Documents/a.pdf"
//! - terminal.run: echo done
//! ```
//!
//! Lines that do not parse are ignored.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::{Arguments, PlanStep};
use crate::guardrail::split_words;

static STEP_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:-\s*)?([A-Za-z0-9_.]+)\s*:\s*(.+)$").ok());

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// Parse every `tool: arguments` line of a goal into a plan step, in order
pub fn parse_inline_plan(goal: &str) -> Vec<PlanStep> {
    goal.lines().filter_map(parse_line).collect()
}

/// Value of a `key: value` line in the goal text (case-insensitive key)
pub fn goal_option(goal: &str, key: &str) -> Option<String> {
    goal.lines().find_map(|line| {
        let (name, value) = line.trim().split_once(':')?;
        let value = value.trim();
        (name.trim().eq_ignore_ascii_case(key) && !value.is_empty()).then(|| value.to_string())
    })
}

fn parse_line(line: &str) -> Option<PlanStep> {
    let caps = STEP_LINE.as_ref()?.captures(line.trim())?;
    let tool = caps.get(1)?.as_str().to_lowercase();
    let rest = caps.get(2)?.as_str().trim();

    // Prose like "Note: ..." or "profile: work" is not a capability call
    if !tool.contains('.') {
        return None;
    }

    let arguments = parse_arguments(&tool, rest)?;
    Some(PlanStep::new(tool, arguments))
}

fn parse_arguments(tool: &str, rest: &str) -> Option<Arguments> {
    let mut args = Arguments::new();

    if tool == "terminal.run" {
        args.insert("cmd".into(), rest.into());
        return Some(args);
    }
    if tool == "http.request"
        && let Some((method, url)) = rest.split_once(char::is_whitespace)
        && HTTP_METHODS.contains(&method.to_uppercase().as_str())
    {
        args.insert("method".into(), method.to_uppercase().into());
        args.insert("url".into(), url.trim().into());
        return Some(args);
    }

    if rest.starts_with('{') {
        return match serde_json::from_str::<Value>(rest) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        };
    }

    let kv = key_values(rest);
    if !kv.is_empty() {
        return Some(kv);
    }

    let key = match tool {
        "fs.listdir" | "fs.read" | "fs.delete" | "data.json.read" => "path",
        "http.request" => "url",
        "pkg.install" | "pkg.uninstall" | "pkg.ensure" => "id",
        _ => return None,
    };
    args.insert(key.into(), rest.into());
    Some(args)
}

// `k=v` tokens, quote-aware; tokens without `=` are dropped
fn key_values(rest: &str) -> Arguments {
    let Ok(words) = split_words(rest) else {
        return Arguments::new();
    };
    words
        .into_iter()
        .filter_map(|word| {
            let (key, value) = word.split_once('=')?;
            let key = key.trim();
            let is_name = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            is_name.then(|| (key.to_string(), Value::String(value.to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mixed_goal() {
        let goal = "Clean up downloads\n\
                    - fs.listdir: /tmp/downloads\n\
                    fs.move: src=/tmp/a.txt dst=\"/tmp/b c.txt\"\n\
                    terminal.run: echo hi | wc -l\n\
                    Note: nothing else";
        let steps = parse_inline_plan(goal);
        assert_eq!(steps.len(), 3);

        assert_eq!(steps[0].capability_name, "fs.listdir");
        assert_eq!(steps[0].arguments.get("path"), Some(&json!("/tmp/downloads")));

        assert_eq!(steps[1].capability_name, "fs.move");
        assert_eq!(steps[1].arguments.get("src"), Some(&json!("/tmp/a.txt")));
        assert_eq!(steps[1].arguments.get("dst"), Some(&json!("/tmp/b c.txt")));

        assert_eq!(steps[2].arguments.get("cmd"), Some(&json!("echo hi | wc -l")));
    }

    #[test]
    fn test_json_arguments() {
        let steps = parse_inline_plan(r#"data.json.write: {"path": "/tmp/x.json", "data": [1, 2]}"#);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].arguments.get("data"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        assert!(parse_inline_plan("data.json.write: {not json").is_empty());
    }

    #[test]
    fn test_http_method_and_url() {
        let steps = parse_inline_plan("http.request: post https://example.com/api\nhttp.request: https://example.com/?q=1");
        assert_eq!(steps[0].arguments.get("method"), Some(&json!("POST")));
        assert_eq!(steps[0].arguments.get("url"), Some(&json!("https://example.com/api")));
        assert_eq!(steps[1].arguments.get("url"), Some(&json!("https://example.com/?q=1")));
        assert!(steps[1].arguments.get("method").is_none());
    }

    #[test]
    fn test_positional_for_unknown_tool_skipped() {
        assert!(parse_inline_plan("browser.click: the blue button").is_empty());
        assert!(parse_inline_plan("vscode.open: ~/notes.md").is_empty());
    }

    #[test]
    fn test_prose_lines_ignored() {
        assert!(parse_inline_plan("Please do this: carefully\nprofile: work\n\n").is_empty());
    }

    #[test]
    fn test_goal_option() {
        let goal = "Open the dashboard\nProfile:  work \n";
        assert_eq!(goal_option(goal, "profile"), Some("work".to_string()));
        assert_eq!(goal_option(goal, "budget"), None);
    }

    #[test]
    fn test_tool_name_lowercased() {
        let steps = parse_inline_plan("FS.ListDir: /tmp");
        assert_eq!(steps[0].capability_name, "fs.listdir");
    }
}
