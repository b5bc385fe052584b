use std::io::{self, BufRead, Write};

use crate::core::models::{Device, Signature};

/// Ask a yes/no question. Anything but `y`/`yes` is a no, including EOF.
pub fn prompt_yes_no<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "{} [y/N] ", question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Interactive confirmation before overwriting an existing signature.
///
/// A failure to read the terminal counts as a refusal.
pub fn confirm_format(device: &Device, signature: &Signature) -> bool {
    let stdin = io::stdin();
    let mut stderr = io::stderr();

    let _ = writeln!(stderr, "{} contains an existing {}.", device, signature);
    let _ = writeln!(stderr, "Formatting will destroy all data on it.");

    prompt_yes_no("Format anyway?", &mut stdin.lock(), &mut stderr).unwrap_or(false)
}
