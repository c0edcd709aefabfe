//! A small interactive shell.
//!
//! Each input line is tokenized ([`lexer`]), turned into a [`parser::CommandLine`]
//! carrying at most one redirection or pipe, and started as one or two child
//! processes by the [`launcher`]. The [`Session`] ties this together with a
//! one-line `!!` history and `&` background jobs.
//!
//! Example
//! ```no_run
//! use osh::io_adapters::EditorSource;
//! use osh::{Config, Session};
//! let mut source = EditorSource::new().unwrap();
//! let mut sh = Session::new(Config::default(), std::io::stdout());
//! let code = sh.run(&mut source).unwrap();
//! std::process::exit(code);
//! ```

pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
pub mod io_adapters;
pub mod launcher;
pub mod lexer;
pub mod parser;
mod session;

pub use config::Config;
pub use error::ShellError;
pub use session::{Dispatch, History, Session};
