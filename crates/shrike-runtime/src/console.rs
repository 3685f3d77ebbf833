//! Console abstraction
//!
//! `print` output and error reports go through an explicit console handle
//! instead of global streams, so the test harness can swap in a capturing
//! console and assert exact output.

/// Output sink threaded through the interpreter
pub trait Console {
    /// Program output (`print`)
    fn out(&mut self, text: &str);
    /// Error reports
    fn error(&mut self, text: &str);
}

/// The process's real stdout/stderr
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn out(&mut self, text: &str) {
        print!("{}", text);
    }

    fn error(&mut self, text: &str) {
        eprint!("{}", text);
    }
}

/// Captures everything written, for tests
#[derive(Debug, Default)]
pub struct CaptureConsole {
    /// Program output
    pub written: String,
    /// Error reports
    pub errors: String,
}

impl CaptureConsole {
    /// Create an empty capturing console
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written to either stream, in write order per stream
    pub fn combined(&self) -> String {
        let mut all = self.written.clone();
        all.push_str(&self.errors);
        all
    }
}

impl Console for CaptureConsole {
    fn out(&mut self, text: &str) {
        self.written.push_str(text);
    }

    fn error(&mut self, text: &str) {
        self.errors.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_streams() {
        let mut console = CaptureConsole::new();
        console.out("1\n");
        console.error("oops\n");
        console.out("2\n");
        assert_eq!(console.written, "1\n2\n");
        assert_eq!(console.errors, "oops\n");
        assert_eq!(console.combined(), "1\n2\noops\n");
    }
}
