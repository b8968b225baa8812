//! Command parsing for exec admission.
//!
//! A shell command line is split into segments on `&&`, `||`, `&`, `;`, `|`
//! and newlines; each segment's executable is checked independently.
//! Subshell and process substitution forms are refused outright because
//! their contents cannot be checked, and so are `<`/`>` redirections, whose
//! targets the sandbox never sees.

use serde::Serialize;

const SUBSHELL_PATTERNS: [&str; 5] = ["`", "$(", "${", "<(", ">("];

/// One executable plus its arguments, as submitted for exec admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecRequest {
    pub binary: String,
    pub args: Vec<String>,
}

impl ExecRequest {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }
}

/// Normalize an executable name to its allow-list key.
///
/// `/usr/bin/Git`, `git.exe` and `C:\Tools\git.EXE` all map to `git`.
pub fn binary_key(binary: &str) -> String {
    let base = binary.rsplit(['/', '\\']).next().unwrap_or(binary).to_lowercase();
    match base.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => base,
    }
}

/// Split a command line into the executables it would run
pub fn command_segments(command: &str) -> Result<Vec<ExecRequest>, String> {
    if let Some(pattern) = SUBSHELL_PATTERNS.iter().find(|p| command.contains(**p)) {
        return Err(format!("subshell expansion '{}' is not allowed", pattern));
    }

    if command.contains(['<', '>']) {
        return Err("redirection is not allowed; use fs.write or fs.read".to_string());
    }

    let normalized = command
        .replace("&&", "\x00")
        .replace("||", "\x00")
        .replace([';', '|', '&', '\n'], "\x00");

    let mut requests = Vec::new();
    for segment in normalized.split('\x00') {
        let words = split_words(segment)?;
        let mut words = words.into_iter().skip_while(|w| is_env_assignment(w));
        if let Some(binary) = words.next() {
            requests.push(ExecRequest::new(binary, words.collect()));
        }
    }

    if requests.is_empty() {
        return Err("empty command".to_string());
    }
    Ok(requests)
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

// Whitespace split that honours single and double quotes
pub(crate) fn split_words(segment: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in segment.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote in command".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_key() {
        assert_eq!(binary_key("git"), "git");
        assert_eq!(binary_key("/usr/bin/git"), "git");
        assert_eq!(binary_key("WINGET.EXE"), "winget");
        assert_eq!(binary_key(r"C:\Tools\Choco.exe"), "choco");
    }

    #[test]
    fn test_single_command() {
        let segs = command_segments("echo hello world").unwrap();
        assert_eq!(segs, vec![ExecRequest::new("echo", vec!["hello".into(), "world".into()])]);
    }

    #[test]
    fn test_chained_commands() {
        let segs = command_segments("ls -la && rm -rf x; cat a | grep b || true").unwrap();
        let bins: Vec<&str> = segs.iter().map(|s| s.binary.as_str()).collect();
        assert_eq!(bins, vec!["ls", "rm", "cat", "grep", "true"]);
    }

    #[test]
    fn test_background_job_is_a_separate_segment() {
        let segs = command_segments("echo hi & rm -rf x").unwrap();
        let bins: Vec<&str> = segs.iter().map(|s| s.binary.as_str()).collect();
        assert_eq!(bins, vec!["echo", "rm"]);

        let segs = command_segments("sleep 1 &").unwrap();
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn test_redirection_refused() {
        assert!(command_segments("echo hi > /etc/passwd").is_err());
        assert!(command_segments("echo hi >> log.txt").is_err());
        assert!(command_segments("cat < secret").is_err());
        assert!(command_segments("echo oops 2>&1").is_err());
    }

    #[test]
    fn test_env_assignments_skipped() {
        let segs = command_segments("FOO=bar _X=1 python script.py").unwrap();
        assert_eq!(segs[0].binary, "python");
        assert_eq!(segs[0].args, vec!["script.py".to_string()]);
    }

    #[test]
    fn test_quoted_arguments() {
        let segs = command_segments(r#"echo "a b" 'c'"#).unwrap();
        assert_eq!(segs[0].args, vec!["a b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_subshell_refused() {
        assert!(command_segments("echo $(whoami)").is_err());
        assert!(command_segments("echo `id`").is_err());
        assert!(command_segments("diff <(ls a) <(ls b)").is_err());
    }

    #[test]
    fn test_empty_and_unterminated() {
        assert!(command_segments("   ").is_err());
        assert!(command_segments("echo 'oops").is_err());
    }
}
