//! Subprocess environments built from profile snapshots.

use std::collections::HashMap;
use std::io;
use std::process::{Command, ExitStatus};

/// Composes a child environment. With `inherit`, the current process
/// environment is the floor; overlays then apply in order, later maps
/// winning.
pub fn build_env<'a, I>(inherit: bool, overlays: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a HashMap<String, String>>,
{
    let mut env: HashMap<String, String> = if inherit {
        std::env::vars().collect()
    } else {
        HashMap::new()
    };
    for overlay in overlays {
        env.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    env
}

/// Runs `argv` with exactly the given environment, inheriting stdio.
pub fn run_with_env(argv: &[String], env: &HashMap<String, String>) -> io::Result<ExitStatus> {
    let Some((program, args)) = argv.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
    };
    Command::new(program).args(args).env_clear().envs(env).status()
}

/// `KEY='value'` pairs on one line, sorted, for prefixing a shell command.
pub fn env_inline(data: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = data.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}='{}'", value.replace('\'', r"'\''")))
        .collect::<Vec<String>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn map(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn overlays_apply_in_order() {
        let first = map(&[("A", "1"), ("B", "first")]);
        let second = map(&[("B", "second"), ("C", "3")]);
        let env = build_env(false, [&first, &second]);
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "second");
        assert_eq!(env["C"], "3");
    }

    #[test]
    fn inherit_includes_the_process_environment() {
        // PATH is as close to universally present as it gets.
        let none: [&HashMap<String, String>; 0] = [];
        let env = build_env(true, none);
        assert!(env.contains_key("PATH"));
        let overlaid = build_env(true, [&map(&[("PATH", "/overridden")])]);
        assert_eq!(overlaid["PATH"], "/overridden");
    }

    #[test]
    fn without_inherit_only_overlays_remain() {
        let env = build_env(false, [&map(&[("ONLY", "this")])]);
        assert_eq!(env.len(), 1);
        assert_eq!(env["ONLY"], "this");
    }

    #[test]
    fn env_inline_is_sorted_and_quoted() {
        let line = env_inline(&map(&[("B", "it's"), ("A", "1")]));
        assert_eq!(line, r"A='1' B='it'\''s'");
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = run_with_env(&[], &HashMap::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[test]
    fn child_process_sees_the_composed_environment() {
        let env = build_env(true, [&map(&[("ENVPROF_TEST_MARKER", "present")])]);
        let status = run_with_env(
            &[
                "sh".to_string(),
                "-c".to_string(),
                "test \"$ENVPROF_TEST_MARKER\" = present".to_string(),
            ],
            &env,
        )
        .unwrap();
        assert!(status.success());
    }
}
