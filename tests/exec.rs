// ABOUTME: Tests for the command execution engine against scripted channels.
// ABOUTME: Time is paused so deadlines and polling are deterministic.

mod support;

use proptest::prelude::*;
use sshctl::exec::{
    CancelSignal, INTERRUPTED_EXIT_CODE, Interrupt, Outcome, RunOptions, TIMEOUT_EXIT_CODE,
    run_on, split_lines,
};
use sshctl::ssh::Error;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::scripted_channel::{Event, ScriptedChannel, closes};
use tokio::time::Instant;

fn capture() -> RunOptions {
    RunOptions::new()
        .capture_output(true)
        .interrupt(Interrupt::Never)
}

mod wait_for_exit {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn echo_hello_is_captured_as_one_line() {
        let channel = ScriptedChannel::new([
            Event::text("hello\r\n"),
            Event::Eof,
            Event::ExitStatus(0),
        ]);
        let counter = channel.close_counter();

        let output = run_on(channel, &capture(), &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.lines, vec!["hello"]);
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.outcome, Outcome::Completed);
        assert!(output.exited);
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nonzero_exit_code_is_returned() {
        let channel = ScriptedChannel::new([
            Event::text("failing\n"),
            Event::ExitStatus(42),
            Event::Eof,
        ]);

        let output = run_on(channel, &capture(), &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.exit_code, 42);
        assert!(!output.success());
    }

    #[tokio::test(start_paused = true)]
    async fn display_writes_to_sink_without_capturing() {
        let channel = ScriptedChannel::new([
            Event::text("one\n"),
            Event::text("two\n"),
            Event::Eof,
            Event::ExitStatus(0),
        ]);
        let options = RunOptions::new()
            .display(true)
            .interrupt(Interrupt::Never);
        let mut sink = Vec::new();

        let output = run_on(channel, &options, &mut sink).await.unwrap();

        assert_eq!(String::from_utf8(sink).unwrap(), "one\ntwo\n");
        assert!(output.lines.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn display_and_capture_see_the_same_output() {
        let channel = ScriptedChannel::new([
            Event::text("a\r\nb"),
            Event::text("\rc\n"),
            Event::Eof,
            Event::ExitStatus(0),
        ]);
        let options = capture().display(true);
        let mut sink = Vec::new();

        let output = run_on(channel, &options, &mut sink).await.unwrap();

        assert_eq!(String::from_utf8(sink).unwrap(), "a\r\nb\rc\n");
        assert_eq!(output.lines, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn utf8_split_across_reads_is_reassembled() {
        let channel = ScriptedChannel::new([
            Event::text("h\u{e9}llo w\u{f6}rld\n"),
            Event::Eof,
            Event::ExitStatus(0),
        ]);
        let options = capture().chunk_size(1);

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.lines, vec!["h\u{e9}llo w\u{f6}rld"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_partial_output_and_exits_with_one() {
        support::init_tracing();
        let channel = ScriptedChannel::new([Event::text("partial\n"), Event::Hang]);
        let counter = channel.close_counter();
        let options = capture().timeout(Duration::from_secs(1));
        let started = Instant::now();

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::TimedOut);
        assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(output.lines, vec!["partial"]);
        assert!(!output.exited);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_per_read_not_total() {
        let channel = ScriptedChannel::new([
            Event::text("1\n"),
            Event::delay_secs(2),
            Event::text("2\n"),
            Event::delay_secs(2),
            Event::text("3\n"),
            Event::Eof,
            Event::ExitStatus(0),
        ]);
        let options = capture().timeout(Duration::from_secs(3));

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Completed);
        assert_eq!(output.lines, vec!["1", "2", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_waits_indefinitely() {
        let channel = ScriptedChannel::new([
            Event::delay_secs(3600),
            Event::text("late\n"),
            Event::Eof,
            Event::ExitStatus(0),
        ]);
        let options = capture().timeout(Duration::ZERO);

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Completed);
        assert_eq!(output.lines, vec!["late"]);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_waiting_with_exit_zero() {
        let channel = ScriptedChannel::new([Event::text("working\n"), Event::Hang]);
        let counter = channel.close_counter();
        let interrupt = CancelSignal::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.set();
        });
        let options = RunOptions::new()
            .capture_output(true)
            .no_timeout()
            .interrupt(Interrupt::Signal(interrupt));

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Interrupted);
        assert_eq!(output.exit_code, INTERRUPTED_EXIT_CODE);
        assert_eq!(output.lines, vec!["working"]);
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eof_without_exit_status_is_an_error() {
        let channel = ScriptedChannel::new([Event::text("bye\n"), Event::Eof]);
        let counter = channel.close_counter();

        let result = run_on(channel, &capture(), &mut std::io::sink()).await;

        assert!(matches!(result, Err(Error::ChannelClosed)));
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_still_closes_once() {
        let channel = ScriptedChannel::new([
            Event::text("start\n"),
            Event::Fail("connection reset".to_string()),
        ]);
        let counter = channel.close_counter();

        let result = run_on(channel, &capture(), &mut std::io::sink()).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(closes(&counter), 1);
    }
}

mod without_output {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_exit_status_without_reading() {
        let channel = ScriptedChannel::new([
            Event::text("ignored\n"),
            Event::delay_secs(3),
            Event::ExitStatus(7),
            Event::Eof,
        ]);
        let counter = channel.close_counter();
        let options = RunOptions::new().interrupt(Interrupt::Never);

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.exit_code, 7);
        assert_eq!(output.outcome, Outcome::Completed);
        assert!(output.lines.is_empty());
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_the_exit_wait() {
        let channel = ScriptedChannel::new([Event::text("busy\n"), Event::Hang]);
        let counter = channel.close_counter();
        let interrupt = CancelSignal::new();
        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.set();
        });
        let options = RunOptions::new()
            .no_timeout()
            .interrupt(Interrupt::Signal(interrupt));

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Interrupted);
        assert_eq!(output.exit_code, INTERRUPTED_EXIT_CODE);
        assert!(!output.exited);
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellable_run_keeps_draining_output() {
        let mut script = Vec::new();
        for _ in 0..20 {
            script.push(Event::text("spam\n"));
            script.push(Event::delay_secs(1));
        }
        script.push(Event::Hang);
        let channel = ScriptedChannel::new(script);
        let bytes_read = channel.bytes_read_counter();
        let counter = channel.close_counter();
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.set();
        });
        let options = RunOptions::new().until(signal);

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Cancelled);
        assert_eq!(bytes_read.load(Ordering::SeqCst), 20 * "spam\n".len());
        assert!(output.lines.is_empty());
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellable_run_ends_at_eof_without_the_signal() {
        let channel = ScriptedChannel::new([
            Event::text("noise\n"),
            Event::ExitStatus(4),
            Event::Eof,
        ]);
        let options = RunOptions::new().until(CancelSignal::new());

        let output = tokio::time::timeout(
            Duration::from_secs(60),
            run_on(channel, &options, &mut std::io::sink()),
        )
        .await
        .expect("EOF should end the run")
        .unwrap();

        assert_eq!(output.outcome, Outcome::Completed);
        assert_eq!(output.exit_code, 4);
        assert!(output.exited);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_applies_to_the_exit_wait() {
        let channel = ScriptedChannel::new([Event::Hang]);
        let options = RunOptions::new()
            .timeout(Duration::from_secs(1))
            .interrupt(Interrupt::Never);

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::TimedOut);
        assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_waits_only_for_the_signal() {
        let channel = ScriptedChannel::new([Event::Hang]);
        let counter = channel.close_counter();
        let signal = CancelSignal::new();
        signal.set();
        let options = RunOptions::new().until(signal);

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Cancelled);
        assert_eq!(output.exit_code, 0);
        assert!(!output.exited);
        assert_eq!(closes(&counter), 1);
    }
}

mod until_cancelled {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn streams_until_signal_then_stops_promptly() {
        let channel = ScriptedChannel::new([
            Event::text("tick 1\n"),
            Event::delay_secs(1),
            Event::text("tick 2\n"),
            Event::Hang,
        ]);
        let counter = channel.close_counter();
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.set();
        });
        let options = RunOptions::new().capture_output(true).until(signal);
        let started = Instant::now();

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert!(started.elapsed() <= Duration::from_secs(5) + options.poll_interval);
        assert_eq!(output.outcome, Outcome::Cancelled);
        assert_eq!(output.lines, vec!["tick 1", "tick 2"]);
        assert_eq!(output.exit_code, 0);
        assert!(!output.exited);
        assert_eq!(closes(&counter), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eof_before_signal_reports_real_status() {
        let channel = ScriptedChannel::new([
            Event::text("done\n"),
            Event::ExitStatus(3),
            Event::Eof,
        ]);
        let options = RunOptions::new()
            .capture_output(true)
            .until(CancelSignal::new());

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Completed);
        assert_eq!(output.exit_code, 3);
        assert!(output.exited);
        assert_eq!(output.lines, vec!["done"]);
    }

    #[tokio::test(start_paused = true)]
    async fn eof_without_status_reports_zero() {
        let channel = ScriptedChannel::new([Event::text("done\n"), Event::Eof]);
        let options = RunOptions::new()
            .capture_output(true)
            .until(CancelSignal::new());

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Completed);
        assert_eq!(output.exit_code, 0);
        assert!(!output.exited);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_ignored() {
        let channel = ScriptedChannel::new([
            Event::delay_secs(30),
            Event::text("slow\n"),
            Event::ExitStatus(0),
            Event::Eof,
        ]);
        let options = RunOptions::new()
            .capture_output(true)
            .until(CancelSignal::new())
            .timeout(Duration::from_secs(1));

        let output = run_on(channel, &options, &mut std::io::sink())
            .await
            .unwrap();

        assert_eq!(output.outcome, Outcome::Completed);
        assert_eq!(output.lines, vec!["slow"]);
    }
}

fn run_chunked(text: &str, chunk_size: usize) -> Vec<String> {
    let channel = ScriptedChannel::new([Event::text(text), Event::Eof, Event::ExitStatus(0)]);
    let options = capture().chunk_size(chunk_size);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime
        .block_on(run_on(channel, &options, &mut std::io::sink()))
        .unwrap()
        .lines
}

proptest! {
    #[test]
    fn lines_do_not_depend_on_chunk_size(
        text in "[a-z\u{e9}\u{4e16} ]{0,20}(\r\n|\n|\r)[a-z\u{e9}\u{4e16} ]{0,20}\n?",
        chunk_size in 1usize..16,
    ) {
        prop_assert_eq!(run_chunked(&text, chunk_size), split_lines(&text));
    }
}
