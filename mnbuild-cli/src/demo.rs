//! `--testcolors`: one line per message class, then a terminal colour table.

use tracing::{debug, error, info, trace, warn};

pub fn show(color: bool) {
    info!("info");
    warn!("warning");
    debug!("verbose");
    trace!("debug");
    error!("error");
    error!("abort");
    print!("{}", colour_table(color));
}

/// Bold SGR codes for every foreground/background digit `0..=9`, one row
/// per foreground. Digits 8 and 9 select extended and default colours.
pub fn colour_table(color: bool) -> String {
    let mut out = String::new();
    for fg in 0..10 {
        for bg in 0..10 {
            let code = format!("1;4{bg};3{fg}");
            if color {
                out.push_str(&format!("\x1b[{code}m{code}\x1b[0m"));
            } else {
                out.push_str(&code);
            }
            out.push('-');
        }
        out.push('\n');
    }
    out
}
