//! Status lines for CLI output

use super::context::UiContext;
use console::style;

/// Report a completed step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}", style("✓").green(), message);
    } else {
        println!("[OK] {}", message);
    }
}

/// Report a completed step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        println!("{} {} ({})", style("✓").green(), message, style(detail).dim());
    } else {
        println!("[OK] {} ({})", message, detail);
    }
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        eprintln!("{} {}", style("!").yellow(), message);
    } else {
        eprintln!("[WARN] {}", message);
    }
}

pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}", style("•").cyan(), message);
    } else {
        println!("[INFO] {}", message);
    }
}

/// Print styled key-value pair
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}

/// Display a remark/hint
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("  {}", style(message).dim());
    } else {
        println!("  {}", message);
    }
}
