//! Used to color and otherwise style diagnostics and tables using a
//! ~/.coreconv/styles.tcss file.
use std::fs::OpenOptions;
use std::io;
use std::io::prelude::*;
use std::path::Path;
use std::sync::LazyLock;
use std::{fs, path::PathBuf};
use termio::prelude::*;
use termio::{StyledString, Termio};

const STYLE_DIR: &str = ".coreconv";
const STYLE_FILE: &str = "styles.tcss";

/// Create the style file if it is missing.
pub fn generate_style_file() {
    if let Some(mut path) = dirs::home_dir() {
        path.push(STYLE_DIR);
        if make_dir(&path) {
            path.push(STYLE_FILE);
            default_styles(path);
        }
    } else {
        eprintln!("couldn't find home directory"); // don't use warn() here
    }
}

pub trait Styling {
    fn explain_title(self) -> StyledString;
    fn explain_text(self) -> StyledString;
    fn table_header(self) -> StyledString;
    fn table_sep(self) -> StyledString;
    fn table_field(self) -> StyledString;
    fn note(self) -> StyledString;
    fn warn(self) -> StyledString;
}

/// Each method maps onto an element in styles.tcss.
macro_rules! impl_styling {
    ($($target:ty),+) => {$(
        impl Styling for $target {
            fn explain_title(self) -> StyledString {
                self.style("explain title", &TCSS)
            }

            fn explain_text(self) -> StyledString {
                self.style("explain text", &TCSS)
            }

            fn table_header(self) -> StyledString {
                self.style("table header", &TCSS)
            }

            fn table_sep(self) -> StyledString {
                self.style("table separator", &TCSS)
            }

            fn table_field(self) -> StyledString {
                self.style("table field", &TCSS)
            }

            fn note(self) -> StyledString {
                self.style("note", &TCSS)
            }

            fn warn(self) -> StyledString {
                self.style("warn", &TCSS)
            }
        }
    )+};
}

impl_styling!(String, &str);

static TCSS: LazyLock<Termio> = LazyLock::new(|| {
    if let Some(mut path) = dirs::home_dir() {
        path.push(STYLE_DIR);
        path.push(STYLE_FILE);
        if !path.exists() {
            return Termio::new();
        }
        let Some(os_path) = path.to_str() else {
            return Termio::new();
        };
        match Termio::from_file(os_path) {
            Ok(tcss) => tcss,
            Err(err) => {
                eprintln!("couldn't parse file at {os_path}: {err}"); // don't use warn() here
                Termio::new()
            }
        }
    } else {
        Termio::new() // we'll have warned about this already
    }
});

fn make_dir(path: &Path) -> bool {
    match fs::create_dir(path) {
        Ok(_) => true,
        Err(err) => match err.kind() {
            io::ErrorKind::AlreadyExists => true,
            _ => {
                eprintln!("couldn't create path for {}: {err}", path.display()); // don't use warn() here
                false
            }
        },
    }
}

fn default_styles(path: PathBuf) {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path.clone())
    {
        Ok(mut file) => {
            let defaults = include_str!("default.tcss");
            if let Err(err) = file.write_all(defaults.as_bytes()) {
                eprintln!("error writing defaults to {}: {err}", path.display());
            }
        }
        Err(err) => match err.kind() {
            io::ErrorKind::AlreadyExists => (), // user already has a styles file
            _ => eprintln!("error creating {}: {err}", path.display()), // don't use warn() here
        },
    }
}
