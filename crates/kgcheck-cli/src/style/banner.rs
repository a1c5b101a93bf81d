//! Banner for kgcheck.

use super::colors::SemanticStyle;

const TAGLINE: &str = "Session consistency checks for replicated stores";

/// Prints the banner shown at the start of long-running commands.
pub fn print_banner() {
    println!();
    println!("  {} {}", "◆".info(), "kgcheck".header());
    println!("  {}", TAGLINE.muted());
    println!();
}

/// Prints the version banner.
pub fn print_version_banner(version: &str) {
    println!();
    println!(
        "  {} {} {}",
        "◆".info(),
        "kgcheck".header(),
        format!("v{version}").muted()
    );
    println!("  {}", TAGLINE.muted());
    println!();
}
