//! Startup banner and run summary display.

use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};
use crate::engine::chorus::RunSummary;

/// Run configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub channel: &'a str,
    pub reactions: &'a [String],
    pub accounts: &'a [String],
    pub backlog_limit: usize,
    pub db: &'a str,
}

/// Print the startup banner with run info.
pub fn print_banner(info: &BannerInfo) {
    let backlog = if info.backlog_limit == 0 {
        "skipped".to_string()
    } else {
        format!("last {}", info.backlog_limit)
    };
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║             C H O R U S               ║
   ║       many voices, one channel        ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   channel   {}
   reactions {}
   accounts  {} ({})
   backlog   {}
   db        {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.channel,
        info.reactions.join(" "),
        info.accounts.len(),
        info.accounts.join(", "),
        backlog,
        info.db,
    );
}

/// Print what the run did, then say goodbye.
pub fn print_run_summary(summary: &RunSummary) {
    if summary.stats.messages > 0 {
        println!(
            "messages: {:>6}   reactions: {:>6}   exhausted: {:>4}",
            format_number(summary.stats.messages),
            format_number(summary.stats.reactions),
            format_number(summary.stats.exhausted),
        );
    }
    if let Some(e) = &summary.backlog.error {
        println!("backlog:  incomplete ({e})");
    }
    println!("goodbye.");
}
