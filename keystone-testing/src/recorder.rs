// Call recording for lifecycle tests

use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered log of calls, shared between a test and the controllers it drives.
///
/// Clones share one log. Put a recorder into the dispatcher's shared state and
/// have lifecycle hooks and actions call [`CallRecorder::record`].
#[derive(Clone, Default, Debug)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: &str) {
        self.record_with(call, Vec::new());
    }

    /// Record a call together with its arguments
    pub fn record_with(&self, call: &str, args: Vec<String>) {
        self.calls.lock().push((call.to_string(), args));
    }

    /// Call names in recording order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(call, _)| call.clone()).collect()
    }

    /// Arguments of every recorded `call`, oldest first.
    pub fn args_of(&self, call: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|(c, _)| c == call)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|(c, _)| c == call).count()
    }

    pub fn was_called(&self, call: &str) -> bool {
        self.count(call) > 0
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Assert the full log equals `expected`.
    pub fn assert_sequence(&self, expected: &[&str]) {
        let calls = self.calls();
        assert_eq!(calls, expected, "Unexpected call sequence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_log() {
        let recorder = CallRecorder::new();
        let hook = recorder.clone();
        hook.record("init");
        hook.record_with("show", vec!["42".to_string()]);
        recorder.record("finish");

        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.args_of("show"), vec![vec!["42".to_string()]]);
        recorder.assert_sequence(&["init", "show", "finish"]);

        hook.clear();
        assert!(recorder.is_empty());
        assert!(!recorder.was_called("init"));
    }

    #[test]
    fn test_concurrent_records() {
        let recorder = CallRecorder::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        recorder.record("finish");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(recorder.count("finish"), 100);
    }

    #[test]
    #[should_panic(expected = "Unexpected call sequence")]
    fn test_sequence_mismatch() {
        let recorder = CallRecorder::new();
        recorder.record("finish");
        recorder.assert_sequence(&["init"]);
    }
}
