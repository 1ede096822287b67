//! Agent output cleaning
//!
//! The agent CLI prints package-manager banners and box-drawing status
//! frames around its reply. This adapter turns raw stdout into reply text.

use super::normalize_reply;

/// Characters that only appear in the CLI's status frames
const DECORATION_CHARS: &[char] = &[
    '◇', '◆', '●', '│', '├', '┤', '╮', '╯', '╭', '╰', '┌', '┐', '└', '┘', '─',
];

/// Markers of runtime warning lines
const BANNER_MARKERS: &[&str] = &["(node:"];

/// Prefixes of package-manager banner lines
const BANNER_PREFIXES: &[&str] = &["npm ", "npm warn", "pnpm "];

/// Recovers the reply from agent stdout
#[derive(Debug, Clone, Default)]
pub struct AgentOutputCleaner;

impl AgentOutputCleaner {
    /// Extract the reply text
    ///
    /// Banner lines are dropped and decoration lines delimit blocks; the
    /// first block with content is the reply. Out-of-band `[[...]]`
    /// directives are removed. Returns `None` when no text remains.
    #[must_use]
    pub fn clean(&self, stdout: &str) -> Option<String> {
        let mut reply: Vec<&str> = Vec::new();

        for line in stdout.lines() {
            let line = line.trim();
            if is_banner(line) {
                continue;
            }
            if is_decoration(line) {
                if reply.is_empty() {
                    continue;
                }
                break;
            }
            if !line.is_empty() {
                reply.push(line);
            }
        }

        let text = normalize_reply(&reply.join("\n"));
        (!text.is_empty()).then_some(text)
    }
}

fn is_banner(line: &str) -> bool {
    BANNER_MARKERS.iter().any(|m| line.contains(m))
        || BANNER_PREFIXES.iter().any(|p| line.starts_with(p))
        || is_script_header(line)
}

/// `> node ...` or `> <pkg>@<version> <script>`, as echoed by npm run
fn is_script_header(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("> ") else {
        return false;
    };
    let first = rest.split_whitespace().next().unwrap_or_default();
    if first == "node" {
        return true;
    }
    // Scoped packages start with '@', so the version marker is the last one
    match first.rfind('@') {
        Some(at) if at > 0 => first[at + 1..].starts_with(|c: char| c.is_ascii_digit()),
        _ => false,
    }
}

fn is_decoration(line: &str) -> bool {
    line.contains(DECORATION_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_and_frames_removed() {
        let stdout = "\n> friday@1.0.0 agent\n> node scripts/run-node.mjs agent\n\n\
            ◇  Agent ─────────╮\n│  thinking        │\n├──────────────────╯\n\
            It's sunny and 22 degrees.\nBring sunglasses.\n\
            └  done\n";

        assert_eq!(
            AgentOutputCleaner.clean(stdout).as_deref(),
            Some("It's sunny and 22 degrees.\nBring sunglasses.")
        );
    }

    #[test]
    fn test_directives_stripped() {
        assert_eq!(
            AgentOutputCleaner.clean("[[tts:cheerful]]Done! [[reply_to:1]]").as_deref(),
            Some("Done!")
        );
    }

    #[test]
    fn test_only_noise_is_none() {
        assert_eq!(AgentOutputCleaner.clean("> node x\n│ ◇ │\n\n"), None);
        assert_eq!(AgentOutputCleaner.clean(""), None);
    }

    #[test]
    fn test_blank_lines_inside_reply_skipped() {
        assert_eq!(
            AgentOutputCleaner.clean("First.\n\nSecond.").as_deref(),
            Some("First.\nSecond.")
        );
    }

    #[test]
    fn test_quoted_reply_lines_kept() {
        let stdout = "> friday@1.0.0 agent\n> node agent.js\n\
            Hamlet says:\n> To be, or not to be.\n> That is the question.";
        assert_eq!(
            AgentOutputCleaner.clean(stdout).as_deref(),
            Some("Hamlet says:\n> To be, or not to be.\n> That is the question.")
        );
    }

    #[test]
    fn test_script_header_forms() {
        assert!(is_script_header("> node scripts/run-node.mjs agent"));
        assert!(is_script_header("> friday@1.0.0 agent"));
        assert!(is_script_header("> @acme/friday@0.3.1 agent"));
        assert!(!is_script_header("> nodes are connected"));
        assert!(!is_script_header("> @everyone please read"));
        assert!(!is_script_header("> mail me@example.com"));
    }

    #[test]
    fn test_node_warnings_dropped() {
        let stdout = "(node:1234) ExperimentalWarning: fetch\nHello there";
        assert_eq!(AgentOutputCleaner.clean(stdout).as_deref(), Some("Hello there"));
    }
}
