// Integration tests for running whole plots against the simulated plotter

#[cfg(test)]
mod tests {
    use penplot_rs::config::PlotterConfig;
    use penplot_rs::errors::ErrorCode;
    use penplot_rs::executor::{
        Instruction, NoProgress, PageSide, PlotExecutor, ProgressSnapshot, RunOptions, RunState,
    };
    use penplot_rs::protocol::GrblPlotter;
    use penplot_rs::sim::{SIM_PORT, SimulatedPlotter};
    use penplot_rs::transport::{Connection, SerialSettings};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn create_test_config() -> PlotterConfig {
        let mut config = PlotterConfig::default();
        config.serial.port = Some(SIM_PORT.to_string());
        config.serial.liveness_timeout_ms = 200;
        config.serial.command_timeout_ms = 1000;
        config.pen.timeout_ms = 2000;
        config.motion.idle_poll_ms = 1;
        config.motion.move_timeout_ms = 2000;
        config.homing.timeout_ms = 2000;
        config.homing.settle_ms = 0;
        config.homing.positioning_settle_ms = 0;
        config.executor.pause_interval_ms = 5;
        config
    }

    async fn create_executor(sim: &SimulatedPlotter) -> PlotExecutor {
        let config = create_test_config();
        let conn = Arc::new(Connection::new(
            Arc::new(sim.clone()),
            SerialSettings::from(&config.serial),
        ));
        conn.connect(None).await.unwrap();
        let plotter = Arc::new(GrblPlotter::new(conn, &config.pen, config.motion.clone()));
        plotter.initialize().await.unwrap();
        sim.clear_commands();
        PlotExecutor::new(plotter, &config)
    }

    fn square_program() -> Vec<Instruction> {
        vec![
            Instruction::move_to(10.0, 10.0),
            Instruction::pen_down(),
            Instruction::draw_to(20.0, 10.0),
            Instruction::draw_to(20.0, 20.0),
            Instruction::draw_to(10.0, 20.0),
            Instruction::draw_to(10.0, 10.0),
            Instruction::pen_up(),
        ]
    }

    fn no_pause_button() -> RunOptions {
        RunOptions { check_voltage: true, poll_pause_button: false }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressSnapshot>>);

    impl Recorder {
        fn push(&self, snapshot: &ProgressSnapshot) {
            self.0.lock().unwrap().push(snapshot.clone());
        }

        fn states(&self) -> Vec<RunState> {
            self.0.lock().unwrap().iter().map(|s| s.state).collect()
        }

        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }

        fn states_since(&self, start: usize) -> Vec<RunState> {
            self.0.lock().unwrap()[start..].iter().map(|s| s.state).collect()
        }

        async fn wait_for(&self, state: RunState) {
            let wait = async {
                while !self.states().contains(&state) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            };
            tokio::time::timeout(Duration::from_secs(2), wait).await.unwrap();
        }

        fn last(&self) -> ProgressSnapshot {
            self.0.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[tokio::test]
    async fn test_plot_square_completes() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let recorder = Arc::new(Recorder::default());
        let sink = {
            let recorder = recorder.clone();
            move |s: &ProgressSnapshot| recorder.push(s)
        };

        let completed = executor
            .execute(&square_program(), PageSide::Front, no_pause_button(), &sink)
            .await
            .unwrap();
        assert!(completed);

        let commands = sim.commands();
        let pos = |c: &str| commands.iter().position(|x| x == c).unwrap();
        assert!(pos("$X") < pos("$H"));
        assert!(pos("$H") < pos("G00 X290.000 Y0.000"));
        assert!(pos("G00 X290.000 Y0.000") < pos("G00 X90.000 Y-10.000"));
        assert!(pos("G00 X90.000 Y-10.000") < pos("G01 X100.000 Y-10.000 F2000.0"));
        assert_eq!(sim.count("G00 Z5.000"), 1);
        assert_eq!(commands.last().map(String::as_str), Some("?"));

        let states = recorder.states();
        assert_eq!(states[0], RunState::Homing);
        assert_eq!(states[1], RunState::Positioning);
        assert_eq!(states.iter().filter(|s| **s == RunState::Plotting).count(), 7);
        let last = recorder.last();
        assert_eq!(last.state, RunState::Completed);
        assert_eq!(last.percentage, 100.0);
        assert_eq!(last.total_commands, 7);
        assert_eq!(sim.position().z, 0.0);
    }

    #[tokio::test]
    async fn test_repeated_pen_down_sent_once() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let program = vec![
            Instruction::pen_down(),
            Instruction::pen_down(),
            Instruction::draw_to(5.0, 5.0),
            Instruction::pen_up(),
            Instruction::pen_up(),
        ];

        assert!(executor.execute(&program, PageSide::Back, no_pause_button(), &NoProgress).await.unwrap());
        assert_eq!(sim.count("G00 Z5.000"), 1);
    }

    #[tokio::test]
    async fn test_move_onto_origin_is_skipped() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        // page (210, 0) is the parked reference corner
        let program = vec![Instruction::move_to(210.0, 0.0)];

        assert!(executor.execute(&program, PageSide::Front, no_pause_button(), &NoProgress).await.unwrap());
        assert_eq!(sim.count("G00 X290.000 Y0.000"), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_plot() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let recorder = Arc::new(Recorder::default());
        let control = executor.control();
        let sink = {
            let recorder = recorder.clone();
            move |s: &ProgressSnapshot| {
                recorder.push(s);
                if s.state == RunState::Plotting && s.current_command == 3 {
                    control.cancel();
                }
            }
        };

        let completed = executor
            .execute(&square_program(), PageSide::Front, no_pause_button(), &sink)
            .await
            .unwrap();
        assert!(!completed);
        assert!(executor.is_cancelled());

        let last = recorder.last();
        assert_eq!(last.state, RunState::Cancelled);
        assert_eq!(last.current_command, 3);
        assert_eq!(sim.count("G01 X100.000 Y-20.000 F2000.0"), 0);
        assert_eq!(sim.position().z, 0.0);
    }

    #[tokio::test]
    async fn test_software_pause_and_resume() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let recorder = Arc::new(Recorder::default());
        let control = executor.control();
        let sink = {
            let recorder = recorder.clone();
            move |s: &ProgressSnapshot| {
                recorder.push(s);
                match (s.state, s.current_command) {
                    (RunState::Plotting, 2) => control.pause(),
                    (RunState::Paused, _) => control.resume(),
                    _ => {}
                }
            }
        };

        assert!(executor.execute(&square_program(), PageSide::Front, no_pause_button(), &sink).await.unwrap());
        let states = recorder.states();
        assert!(states.contains(&RunState::Paused));
        assert_eq!(recorder.last().state, RunState::Completed);
        assert_eq!(sim.count("~"), 0);
    }

    /// Starts `square_program` in the background; the sink pauses the run after instruction 2.
    fn spawn_paused_run(
        executor: &Arc<PlotExecutor>,
        recorder: &Arc<Recorder>,
    ) -> tokio::task::JoinHandle<Result<bool, penplot_rs::PlotterError>> {
        let executor = executor.clone();
        let recorder = recorder.clone();
        let control = executor.control();
        tokio::spawn(async move {
            let sink = move |s: &ProgressSnapshot| {
                recorder.push(s);
                if s.state == RunState::Plotting && s.current_command == 2 {
                    control.pause();
                }
            };
            executor
                .execute(&square_program(), PageSide::Front, no_pause_button(), &sink)
                .await
        })
    }

    #[tokio::test]
    async fn test_paused_run_sends_nothing_until_resumed() {
        let sim = SimulatedPlotter::new();
        let executor = Arc::new(create_executor(&sim).await);
        let recorder = Arc::new(Recorder::default());
        let run = spawn_paused_run(&executor, &recorder);

        recorder.wait_for(RunState::Paused).await;
        let sent = sim.commands().len();
        let seen = recorder.len();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(sim.commands().len(), sent);
        let while_paused = recorder.states_since(seen);
        assert!(!while_paused.is_empty());
        assert!(while_paused.iter().all(|s| *s == RunState::Paused));
        assert!(executor.is_paused());

        executor.resume();
        assert!(run.await.unwrap().unwrap());
        assert!(sim.commands().len() > sent);
        assert_eq!(recorder.last().state, RunState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_while_paused() {
        let sim = SimulatedPlotter::new();
        let executor = Arc::new(create_executor(&sim).await);
        let recorder = Arc::new(Recorder::default());
        let run = spawn_paused_run(&executor, &recorder);

        recorder.wait_for(RunState::Paused).await;
        executor.cancel();

        assert!(!run.await.unwrap().unwrap());
        let last = recorder.last();
        assert_eq!(last.state, RunState::Cancelled);
        assert_eq!(last.current_command, 2);
        assert_eq!(sim.count("G01 X100.000 Y-10.000 F2000.0"), 0);
        assert_eq!(sim.position().z, 0.0);
    }

    #[tokio::test]
    async fn test_controller_hold_resumes_with_cycle_start() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let recorder = Arc::new(Recorder::default());
        let control = executor.control();
        let sink = {
            let recorder = recorder.clone();
            let sim = sim.clone();
            move |s: &ProgressSnapshot| {
                recorder.push(s);
                match (s.state, s.current_command) {
                    (RunState::Plotting, 10) => sim.press_pause_button(),
                    (RunState::Paused, _) => control.resume(),
                    _ => {}
                }
            }
        };
        let program: Vec<Instruction> = (0..12).map(|i| Instruction::move_to(i as f64, 0.0)).collect();

        assert!(executor.execute(&program, PageSide::Front, RunOptions::default(), &sink).await.unwrap());
        let paused: Vec<_> = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.state == RunState::Paused)
            .map(|s| s.current_command)
            .collect();
        assert!(!paused.is_empty());
        assert!(paused.iter().all(|&i| i == 10));
        assert_eq!(sim.count("~"), 1);
        assert_eq!(recorder.last().state, RunState::Completed);
    }

    #[tokio::test]
    async fn test_disconnect_mid_plot_reports_position_in_program() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let recorder = Arc::new(Recorder::default());
        let sink = {
            let recorder = recorder.clone();
            let sim = sim.clone();
            move |s: &ProgressSnapshot| {
                recorder.push(s);
                if s.state == RunState::Plotting && s.current_command == 2 {
                    sim.disconnect_after(1);
                }
            }
        };

        let err = executor
            .execute(&square_program(), PageSide::Back, no_pause_button(), &sink)
            .await
            .unwrap_err();
        assert!(err.is(&ErrorCode::DEVICE_DISCONNECTED));
        assert_eq!(err.context().get("command_index").and_then(|v| v.as_u64()), Some(2));
        assert_eq!(err.context().get("total_commands").and_then(|v| v.as_u64()), Some(7));
        assert_eq!(err.context().get("side").and_then(|v| v.as_str()), Some("back"));
        assert!(err.context().contains_key("origin"));

        let last = recorder.last();
        assert_eq!(last.state, RunState::Error);
        assert_eq!(last.error_code.as_deref(), Some("PLT-C004"));
        assert!(!executor.plotter().connection().is_connected());
    }

    #[tokio::test]
    async fn test_homing_failure_aborts_before_plotting() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let recorder = Arc::new(Recorder::default());
        let sink = {
            let recorder = recorder.clone();
            move |s: &ProgressSnapshot| recorder.push(s)
        };

        sim.script_reply("$H", "ALARM:9");
        let err = executor
            .execute(&square_program(), PageSide::Front, no_pause_button(), &sink)
            .await
            .unwrap_err();
        assert!(err.is(&ErrorCode::HOMING_FAILED));
        assert_eq!(err.context().get("command_index").and_then(|v| v.as_u64()), Some(0));
        assert!(!err.context().contains_key("origin"));
        assert_eq!(recorder.states(), vec![RunState::Homing, RunState::Error]);
        assert_eq!(sim.count("G00 X290.000 Y0.000"), 0);
    }

    #[tokio::test]
    async fn test_non_finite_target_is_invalid_response() {
        let sim = SimulatedPlotter::new();
        let executor = create_executor(&sim).await;
        let program = vec![Instruction::move_to(5.0, 5.0), Instruction::draw_to(f64::NAN, 3.0)];

        let err = executor
            .execute(&program, PageSide::Envelope, no_pause_button(), &NoProgress)
            .await
            .unwrap_err();
        assert!(err.is(&ErrorCode::INVALID_RESPONSE));
        assert_eq!(err.context().get("command_index").and_then(|v| v.as_u64()), Some(1));
        assert!(err.context().contains_key("original_error"));
        assert_eq!(sim.position().z, 0.0);
    }
}
