#![allow(dead_code)]

use brrtdispatch::dispatcher::{DispatchOutcome, Dispatcher};
use brrtdispatch::server::{BufferedWriter, Request};

/// Run `request` through `dispatcher` into an in-memory writer.
pub fn dispatch(dispatcher: &Dispatcher, request: Request) -> (DispatchOutcome, BufferedWriter) {
    let mut out = BufferedWriter::new();
    let outcome = dispatcher.handle(request, &mut out);
    (outcome, out)
}

pub mod temp_files {
    use std::path::PathBuf;

    /// Write `content` to a fresh temp dir; the dir lives as long as the
    /// returned guard.
    pub fn create_temp_spec(content: &str, ext: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("openapi.{ext}"));
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    pub fn create_temp_yaml(content: &str) -> (tempfile::TempDir, PathBuf) {
        create_temp_spec(content, "yaml")
    }

    pub fn create_temp_json(content: &str) -> (tempfile::TempDir, PathBuf) {
        create_temp_spec(content, "json")
    }
}

pub mod log_capture {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Thread-local subscriber that records formatted events for assertions.
    pub struct LogCapture {
        buf: SharedBuf,
        _guard: tracing::subscriber::DefaultGuard,
    }

    impl LogCapture {
        pub fn init() -> Self {
            let buf = SharedBuf::default();
            let writer = buf.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            Self { buf, _guard: guard }
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buf.0.lock().unwrap()).into_owned()
        }
    }
}
