//! Command policy: denylist over the base command plus argument
//! sanitization.
//!
//! The denylist matches the first whitespace-delimited token only.
//! Absolute paths, aliases and interpreter indirection bypass it, so
//! treat it as advisory and pair it with external isolation; it is
//! kept for behavioral compatibility, not as a security boundary.

use crate::error::{Error, Result};

/// Base commands rejected outright: destructive, privilege-escalation,
/// network-fetch, process-control and low-level disk tools.
pub const DENYLISTED_COMMANDS: &[&str] = &[
    "rm", "del", "format", "fdisk", "mkfs",
    "sudo", "su", "chmod", "chown",
    "wget", "curl", "nc", "netcat",
    "ssh", "scp", "ftp", "telnet",
    "ps", "kill", "killall", "pkill",
    "mount", "umount", "dd",
];

/// Shell metacharacters disallowed anywhere in an argument.
pub const DISALLOWED_ARG_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>',
];

/// A command/argument list that passed the policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedCommand {
    pub command: String,
    pub args: Vec<String>,
}

/// Normalize and validate a requested command and its arguments.
///
/// The command is reduced to the substring before the first space and
/// lowercased; arguments are trimmed of surrounding whitespace.
/// Rejection is synchronous with a descriptive reason and has no side
/// effects.
pub fn sanitize(command: &str, args: &[String]) -> Result<SanitizedCommand> {
    let base = command
        .split(' ')
        .next()
        .unwrap_or("")
        .to_lowercase();

    if base.is_empty() {
        return Err(Error::Validation("command must be non-empty".into()));
    }

    if DENYLISTED_COMMANDS.contains(&base.as_str()) {
        return Err(Error::Policy(format!(
            "command '{base}' is not allowed"
        )));
    }

    let mut sanitized = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(c) = arg.chars().find(|c| DISALLOWED_ARG_CHARS.contains(c)) {
            return Err(Error::Policy(format!(
                "argument contains disallowed character '{c}': {arg}"
            )));
        }
        sanitized.push(arg.trim().to_string());
    }

    Ok(SanitizedCommand {
        command: base,
        args: sanitized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_denylisted_command() {
        let err = sanitize("rm -rf /", &args(&["-rf", "/"])).unwrap_err();
        assert!(matches!(err, Error::Policy(_)));
    }

    #[test]
    fn denylist_applies_to_base_token_case_insensitively() {
        assert!(sanitize("SUDO whatever", &[]).is_err());
        assert!(sanitize("Wget", &[]).is_err());
    }

    #[test]
    fn rejects_argument_with_metacharacter() {
        for bad in ["a;b", "x && y", "`id`", "$(id)", "a|b", "<in", "out>"] {
            let err = sanitize("echo", &args(&[bad])).unwrap_err();
            assert!(matches!(err, Error::Policy(_)), "expected rejection for {bad}");
        }
    }

    #[test]
    fn rejects_empty_command() {
        assert!(matches!(sanitize("", &[]), Err(Error::Validation(_))));
    }

    #[test]
    fn normalizes_and_trims() {
        let ok = sanitize("Echo hello", &args(&["  hi  ", "there"])).unwrap();
        assert_eq!(ok.command, "echo");
        assert_eq!(ok.args, vec!["hi".to_string(), "there".to_string()]);
    }
}
