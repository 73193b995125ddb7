use mockall::mock;
use qcmd_core::Logger;

mock! {
    // Logger double; set expectations on the diagnostics a run should emit.
    pub Sink {}
    impl Logger for Sink {
        fn info(&self, message: &str);
        fn warn(&self, message: &str);
        fn error(&self, message: &str);
    }
}

/// A sink that accepts progress messages and fails on any warning or error.
pub fn quiet_sink() -> MockSink {
    let mut sink = MockSink::new();
    let _ = sink.expect_info().return_const(());
    let _ = sink.expect_warn().never();
    let _ = sink.expect_error().never();
    sink
}
