//! Output helpers: cliclack framing in a terminal, tagged lines otherwise

use super::context::UiContext;
use console::{style, StyledObject};

/// Tag printed in front of plain-mode status lines
fn tag(label: &'static str) -> StyledObject<&'static str> {
    match label {
        "[OK]" => style(label).green(),
        "[WARN]" => style(label).yellow(),
        "[FAIL]" => style(label).red(),
        _ => style(label).blue(),
    }
}

fn plain_step(label: &'static str, message: &str) {
    println!("  {} {}", tag(label), message);
}

/// Title banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).blue().bold()).ok();
    } else {
        println!("{}\n", style(title).blue().bold());
    }
}

/// Closing line after a clean run
pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!("\n{} {}", tag("[OK]"), message);
    }
}

/// Closing line after a run that left something out
pub fn outro_warn(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).yellow().bold()).ok();
    } else {
        println!("\n{} {}", tag("[WARN]"), message);
    }
}

pub fn note(ctx: &UiContext, title: &str, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::note(title, message).ok();
    } else {
        println!("{}: {}", style(title).bold(), message);
    }
}

pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(message).ok();
    } else {
        plain_step("[OK]", message);
    }
}

/// Success with a dimmed detail, e.g. a path or a size
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        plain_step("[OK]", &format!("{} ({})", message, detail));
    }
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(message).ok();
    } else {
        plain_step("[WARN]", message);
    }
}

/// Warning with the reason or remedy after a dash
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        plain_step("[WARN]", &format!("{} - {}", message, hint));
    }
}

pub fn step_error(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::error(message).ok();
    } else {
        plain_step("[FAIL]", message);
    }
}

pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(message).ok();
    } else {
        plain_step("[INFO]", message);
    }
}

pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  {}", style(message).dim());
    }
}

pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}
