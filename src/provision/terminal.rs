use std::io::Write;
use std::sync::{Arc, Mutex};

/// Where terminal output is displayed. Holds no business state.
pub trait TerminalSink: Send + Sync {
    fn render(&self, chunk: &str);

    /// Called once when the terminal using this sink is disposed.
    fn reset(&self) {}
}

type InputHandler = Box<dyn FnMut(&str) + Send>;

/// Display buffer of one provisioning session.
///
/// Everything written is also kept as scrollback for the life of the
/// session. Operator input goes to the handler registered with `on_data`.
pub struct Terminal {
    sink: Option<Arc<dyn TerminalSink>>,
    scrollback: String,
    input: Option<InputHandler>,
    disposed: bool,
}

impl Terminal {
    pub fn attach(sink: Arc<dyn TerminalSink>) -> Self {
        Self {
            sink: Some(sink),
            scrollback: String::new(),
            input: None,
            disposed: false,
        }
    }

    /// A terminal without a display; output only reaches the scrollback.
    pub fn detached() -> Self {
        Self {
            sink: None,
            scrollback: String::new(),
            input: None,
            disposed: false,
        }
    }

    pub fn write(&mut self, chunk: &str) {
        if self.disposed {
            return;
        }
        self.scrollback.push_str(chunk);
        if let Some(sink) = &self.sink {
            sink.render(chunk);
        }
    }

    pub fn on_data<F>(&mut self, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        if !self.disposed {
            self.input = Some(Box::new(handler));
        }
    }

    /// Forward operator keystrokes. Returns false when nothing is listening.
    pub fn input(&mut self, chunk: &str) -> bool {
        match self.input.as_mut() {
            Some(handler) => {
                handler(chunk);
                true
            }
            None => false,
        }
    }

    pub fn scrollback(&self) -> &str {
        &self.scrollback
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.input = None;
        if let Some(sink) = self.sink.take() {
            sink.reset();
        }
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Writes output straight to the process stdout.
pub struct StdoutSink;

impl TerminalSink for StdoutSink {
    fn render(&self, chunk: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    }
}

/// Collects output in memory.
#[derive(Default)]
pub struct MemorySink {
    buffer: Mutex<String>,
    resets: Mutex<usize>,
}

impl MemorySink {
    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }
}

impl TerminalSink for MemorySink {
    fn render(&self, chunk: &str) {
        self.buffer.lock().unwrap().push_str(chunk);
    }

    fn reset(&self) {
        self.buffer.lock().unwrap().clear();
        *self.resets.lock().unwrap() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_reaches_sink_and_scrollback() {
        let sink = Arc::new(MemorySink::default());
        let mut term = Terminal::attach(sink.clone());
        term.write("hello ");
        term.write("world");
        assert_eq!(term.scrollback(), "hello world");
        assert_eq!(sink.contents(), "hello world");
    }

    #[test]
    fn input_goes_to_registered_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut term = Terminal::detached();
        assert!(!term.input("x"));
        let log = seen.clone();
        term.on_data(move |chunk| log.lock().unwrap().push(chunk.to_string()));
        assert!(term.input("ls\r"));
        assert_eq!(*seen.lock().unwrap(), vec!["ls\r".to_string()]);
    }

    #[test]
    fn dispose_is_idempotent_and_detaches_input() {
        let sink = Arc::new(MemorySink::default());
        let mut term = Terminal::attach(sink.clone());
        term.on_data(|_| {});
        term.dispose();
        term.dispose();
        assert_eq!(sink.resets(), 1);
        assert!(!term.input("x"));
        term.write("late");
        assert_eq!(term.scrollback(), "");
    }

    #[test]
    fn dispose_without_attach_is_safe() {
        let mut term = Terminal::detached();
        term.dispose();
        assert!(term.is_disposed());
    }
}
