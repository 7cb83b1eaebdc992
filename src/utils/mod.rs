pub mod styles;
#[cfg(test)]
pub mod test_core;

pub use styles::*;

use std::error::Error;

pub fn require(predicate: bool, err: &str) -> Result<(), Box<dyn Error>> {
    if predicate { Ok(()) } else { Err(err.into()) }
}

/// Non-fatal problems, e.g. a backing file that had to be zero-filled.
pub fn warn(mesg: &str) {
    eprintln!("{}", mesg.warn());
}

/// Progress information, e.g. which file was picked as the main executable.
pub fn note(mesg: &str) {
    println!("{}", mesg.note());
}

/// Rounds a note size up to a multiple of four. Done in usize so the largest
/// sizes can't wrap.
pub fn align_to_word(n: u32) -> usize {
    (n as usize + 3) & !3
}

/// Like writeln! but for output where there is nothing useful to do if the write fails
/// (e.g. stdout was closed).
macro_rules! uwriteln {
    ($out:expr) => {
        let _ = writeln!($out);
    };
    ($out:expr, $($arg:tt)*) => {
        let _ = writeln!($out, $($arg)*);
    };
}
pub(crate) use uwriteln;

/// Remove escape sequences from the string (e.g. for colors).
#[cfg(test)]
pub fn strip_escapes(s: &str) -> String {
    // Even with an empty style sheet the tabled crate will add escape sequences to the
    // end of lines to reset all modes.
    let mut result = String::with_capacity(s.len());
    let mut escaping = false;

    // Note that escape sequences can be fairly gnarly, e.g. for RGB colors.
    // See https://gist.github.com/fnky/458719343aabd01cfb17a3a4f7296797
    for c in s.chars() {
        if c == '\x1b' {
            escaping = true;
        } else if escaping {
            if c == 'm' {
                escaping = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}
