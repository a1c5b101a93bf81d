//! Line-oriented output: check results, run verdicts and violations.
//!
//! Failures go to stderr so `--json` output on stdout stays parseable.

use kgcheck::Violation;

use super::colors::SemanticStyle;

/// Prints a passed check.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

/// Prints a failed check or a harness error.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".error(), msg);
}

/// Prints a notice about a run that ended early.
pub fn print_warn(msg: &str) {
    println!("{} {}", "!".warning(), msg);
}

pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {}", key.muted(), value);
}

pub fn print_spacer() {
    println!();
}

/// Prints one violation found by `client`.
pub fn print_violation(client: &str, violation: &Violation) {
    println!(
        "  {} {} step {}: missing {} (view {})",
        client.header(),
        violation.guarantee.to_string().error(),
        violation.step,
        violation.missing,
        violation.view
    );
}

/// Prints the overall PASS/FAIL line.
pub fn print_verdict(passed: bool) {
    if passed {
        println!("{}", "PASS".success());
    } else {
        println!("{}", "FAIL".error());
    }
}
