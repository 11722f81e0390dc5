//! Command dispatcher (spec §4.F). Grounded on
//! `original_source/.../core/argument-parser.c`: a table of `(long,
//! short)` names mapping to handlers, and the "longest suffix
//! containing no further command names" argv-slicing rule.

use std::collections::HashMap;
use std::os::fd::RawFd;

use crate::error::{ClimpError, Result};

/// `cwd`, the command's own sub-argv, and the connection's transferred
/// stdin descriptor (only the `stdin` command reads it; every other
/// handler ignores the fd).
pub type Handler = Box<dyn Fn(&str, &[String], RawFd) -> Result<String> + Send>;

/// Seeded at startup with every recognized command; `run` slices the
/// incoming argv per `argument-parser.c`'s rule and dispatches each
/// slice to its handler.
pub struct Dispatcher {
    names: HashMap<String, usize>,
    handlers: Vec<Handler>,
    default_handler: Option<Box<dyn Fn(&str) + Send>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            names: HashMap::new(),
            handlers: Vec::new(),
            default_handler: None,
        }
    }

    /// Registers `handler` under both `long` and `short` (pass `""`
    /// for no short form).
    pub fn register(&mut self, long: &str, short: &str, handler: Handler) {
        let idx = self.handlers.len();
        self.handlers.push(handler);
        self.names.insert(long.to_string(), idx);
        if !short.is_empty() {
            self.names.insert(short.to_string(), idx);
        }
    }

    pub fn set_default_handler(&mut self, handler: impl Fn(&str) + Send + 'static) {
        self.default_handler = Some(Box::new(handler));
    }

    fn is_command(&self, token: &str) -> bool {
        self.names.contains_key(token)
    }

    /// Scans `argv` left to right. Each recognized token consumes the
    /// longest run of following tokens that contains no further
    /// command name as its sub-argv; unrecognized tokens go to the
    /// default handler. Output is the concatenation of every handler's
    /// textual result, in order. `cwd` is the connecting client's
    /// working directory, threaded through so handlers can resolve
    /// relative path arguments against it rather than the daemon's own
    /// (daemonized, `/`-rooted) cwd; `stdin_fd` is the connection's
    /// transferred stdin descriptor, handed to whichever handler asks
    /// for it (only the `stdin` command does).
    pub fn run(&self, cwd: &str, argv: &[String], stdin_fd: RawFd) -> String {
        let mut out = String::new();
        let mut i = 0;
        while i < argv.len() {
            let token = &argv[i];
            let Some(&idx) = self.names.get(token.as_str()) else {
                tracing::warn!(arg = %token, "skipping invalid argument");
                if let Some(default) = &self.default_handler {
                    default(token);
                }
                i += 1;
                continue;
            };

            let mut j = i + 1;
            while j < argv.len() && !self.is_command(&argv[j]) {
                j += 1;
            }
            let sub_argv = &argv[i + 1..j];

            match (self.handlers[idx])(cwd, sub_argv, stdin_fd) {
                Ok(text) => {
                    if !text.is_empty() {
                        out.push_str(&text);
                        if !out.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(command = %token, error = %e, "command failed");
                    out.push_str(&format!("{token}: {e}\n"));
                }
            }

            i = j;
        }
        out
    }

    /// Like `run`, but stops at — and returns — the first error
    /// instead of collecting text, matching the status-reply contract
    /// of §4.H (one numeric status per connection).
    pub fn run_checked(&self, cwd: &str, argv: &[String], stdin_fd: RawFd) -> Result<String> {
        if argv.is_empty() {
            return Err(ClimpError::Usage("no command given".into()));
        }
        let mut i = 0;
        let mut out = String::new();
        while i < argv.len() {
            let token = &argv[i];
            let Some(&idx) = self.names.get(token.as_str()) else {
                return Err(ClimpError::UnknownCommand(token.clone()));
            };

            let mut j = i + 1;
            while j < argv.len() && !self.is_command(&argv[j]) {
                j += 1;
            }
            let sub_argv = &argv[i + 1..j];

            out.push_str(&(self.handlers[idx])(cwd, sub_argv, stdin_fd)?);
            i = j;
        }
        Ok(out)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn args(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sub_argv_stops_at_the_next_known_command() {
        let seen: Arc<std::sync::Mutex<Vec<Vec<String>>>> = Default::default();
        let mut d = Dispatcher::new();
        let seen2 = seen.clone();
        d.register(
            "add",
            "a",
            Box::new(move |_cwd, argv, _stdin| {
                seen2.lock().unwrap().push(argv.to_vec());
                Ok(String::new())
            }),
        );
        d.register("play", "p", Box::new(|_cwd, _, _stdin| Ok(String::new())));

        d.run_checked("/", &args(&["add", "x.mp3", "y.mp3", "play"]), -1)
            .unwrap();

        assert_eq!(seen.lock().unwrap()[0], vec!["x.mp3", "y.mp3"]);
    }

    #[test]
    fn unknown_leading_token_is_an_error_in_run_checked() {
        let d = Dispatcher::new();
        assert!(d.run_checked("/", &args(&["nonsense"]), -1).is_err());
    }

    #[test]
    fn empty_argv_is_a_usage_error() {
        let d = Dispatcher::new();
        assert!(matches!(
            d.run_checked("/", &[], -1),
            Err(ClimpError::Usage(_))
        ));
    }

    #[test]
    fn default_handler_receives_unrecognized_tokens_in_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let mut d = Dispatcher::new();
        d.set_default_handler(move |_| {
            count2.fetch_add(1, Ordering::Relaxed);
        });
        d.run("/", &args(&["garbage"]), -1);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
