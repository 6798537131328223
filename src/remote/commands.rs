//! Shell command strings sent to the instance.

use shell_escape::unix::escape;

const AUTHORIZED_KEYS: &str = "~/.ssh/authorized_keys";

/// Wraps script contents so the remote login shell hands them to `sh -c`.
#[must_use]
pub fn script_command(contents: &str) -> String {
    format!("sh -c {}", escape(contents.into()))
}

/// Builds a command removing `public_key` from the remote `authorized_keys`.
///
/// Only the key type and key body are matched, so a comment appended by the
/// provider does not stop the line from being removed. A missing file is not
/// an error.
#[must_use]
pub fn remove_authorized_key_command(public_key: &str) -> String {
    let needle = public_key
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");
    let escaped = escape(needle.into());
    let staged = format!("{AUTHORIZED_KEYS}.letsbake");
    format!(
        "if [ -f {AUTHORIZED_KEYS} ]; then \
         grep -vF -- {escaped} {AUTHORIZED_KEYS} > {staged} || true; \
         mv {staged} {AUTHORIZED_KEYS}; \
         chmod 600 {AUTHORIZED_KEYS}; \
         fi"
    )
}
