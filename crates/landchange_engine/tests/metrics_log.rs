//! Job completion is logged together with the engine counters.

use landchange_engine::{Context, EngineConfig};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_finished_job_logs_metrics_snapshot() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();

    let ctx = Context::new(EngineConfig::with_threads(2)).unwrap();
    let ds = ctx
        .parallelize((0..9).collect::<Vec<i32>>(), 3)
        .map(|x| x + 1)
        .with_name("staged pixels");
    let count = tracing::subscriber::with_default(subscriber, || ds.count().unwrap());
    assert_eq!(count, 9);

    let output = captured.contents();
    let line = output
        .lines()
        .find(|line| line.contains("Job 'staged pixels' finished 3 partitions"))
        .unwrap_or_else(|| panic!("no job line in:\n{}", output));
    assert!(line.contains("metrics=MetricsSnapshot { tasks_run: 3"), "{}", line);
    assert!(line.contains("shuffles: 0"), "{}", line);
}
