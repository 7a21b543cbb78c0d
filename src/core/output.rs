//! Colored terminal output
//!
//! Uses owo-colors for terminal colors. Progress bars live in
//! `helpers::internal::progress`.

use owo_colors::OwoColorize;

/// Print an action header (blue, bold)
/// Example: "==> Bootstrapping 12 libraries"
pub fn action(message: &str) {
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Print a library header with a counter
/// Example: "(3/12) glfw"
pub fn library(current: usize, total: usize, name: &str) {
    println!(
        "{} {}",
        format!("({}/{})", current, total).cyan(),
        name.bold()
    );
}

/// Print a sub-action (cyan arrow)
/// Example: "  -> acquire"
pub fn sub_action(step: &str) {
    println!("  {} {}", "->".cyan(), step);
}

/// Print a detail line (dimmed)
pub fn detail(message: &str) {
    println!("     {}", message.dimmed());
}

/// Print a success message (green)
pub fn success(message: &str) {
    println!("{} {}", "==>".green().bold(), message.green());
}

/// Print an info message (cyan)
pub fn info(message: &str) {
    println!("{} {}", "::".cyan(), message);
}

/// Print a warning message (yellow)
pub fn warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

/// Print an error message (red)
pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Print a skip message (dimmed)
/// Example: "==> cached state for glfw matches manifest, skipping"
pub fn skip(message: &str) {
    println!("{} {}", "==>".dimmed(), message.dimmed());
}

/// Print the list of libraries that failed, one per line with the reason.
pub fn failure_summary(failures: &[(String, String)]) {
    eprintln!(
        "{} {}",
        "error:".red().bold(),
        "FAILURE to bootstrap the following libraries:".red().bold()
    );
    for (name, reason) in failures {
        eprintln!("  {} {} {}", "-".red(), name.bold(), reason.dimmed());
    }
}
