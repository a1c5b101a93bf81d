//! Version command implementation.

use crate::style::banner::print_version_banner;
use crate::style::print_labeled;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    print_version_banner(VERSION);
    print_labeled("Target", std::env::consts::ARCH);
    print_labeled("OS", std::env::consts::OS);
}
