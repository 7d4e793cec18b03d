// Integration tests for the serial connection against the simulated plotter

#[cfg(test)]
mod tests {
    use penplot_rs::errors::ErrorCode;
    use penplot_rs::sim::{SIM_PORT, SimulatedPlotter};
    use penplot_rs::transport::{Connection, SerialSettings};
    use std::io;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn create_test_settings() -> SerialSettings {
        SerialSettings {
            baud_rate: 115200,
            port_timeout: Duration::from_secs(1),
            liveness_timeout: Duration::from_millis(200),
            command_timeout: Duration::from_secs(1),
        }
    }

    fn create_connection(sim: &SimulatedPlotter) -> Connection {
        Connection::new(Arc::new(sim.clone()), create_test_settings())
    }

    #[tokio::test]
    async fn test_discovery_marks_compatible_port() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        let ports = conn.list_ports();
        assert_eq!(ports.len(), 1);
        assert!(ports[0].compatible);
        assert_eq!(ports[0].vid, Some(0x1A86));
        assert_eq!(conn.find_port().as_deref(), Some(SIM_PORT));
    }

    #[tokio::test]
    async fn test_connect_without_device_fails_no_device_found() {
        let sim = SimulatedPlotter::new();
        sim.set_present(false);
        let conn = create_connection(&sim);

        let err = conn.connect(None).await.unwrap_err();
        assert!(err.is(&ErrorCode::NO_DEVICE_FOUND));
        assert!(!conn.is_connected());
        assert_eq!(sim.sessions(), 0);
    }

    #[tokio::test]
    async fn test_connect_auto_detects_and_identifies() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        conn.connect(None).await.unwrap();

        assert!(conn.is_connected());
        assert_eq!(conn.port_name().as_deref(), Some(SIM_PORT));
        let firmware = conn.firmware_version().unwrap();
        assert!(firmware.starts_with("[VER:1.1h"), "got {}", firmware);
        assert_eq!(sim.commands(), vec!["$I".to_string()]);
    }

    #[tokio::test]
    async fn test_silent_device_is_not_responding() {
        let sim = SimulatedPlotter::new();
        sim.set_silent(true);
        let conn = create_connection(&sim);

        let err = conn.connect(Some(SIM_PORT)).await.unwrap_err();
        assert!(err.is(&ErrorCode::DEVICE_NOT_RESPONDING));
        assert!(!conn.is_connected());
        // `$I` then the legacy identify
        assert_eq!(sim.commands(), vec!["$I".to_string(), "V".to_string()]);
    }

    #[tokio::test]
    async fn test_liveness_check_stays_within_budget() {
        let sim = SimulatedPlotter::new();
        sim.set_silent(true);
        let settings = SerialSettings {
            liveness_timeout: Duration::from_millis(300),
            ..create_test_settings()
        };
        let conn = Connection::new(Arc::new(sim.clone()), settings);

        let start = Instant::now();
        let err = conn.connect(Some(SIM_PORT)).await.unwrap_err();
        let elapsed = start.elapsed();
        assert!(err.is(&ErrorCode::DEVICE_NOT_RESPONDING));
        assert!(elapsed < Duration::from_millis(450), "liveness check took {:?}", elapsed);
        assert_eq!(sim.count("V"), 1);
    }

    #[tokio::test]
    async fn test_open_failures_are_classified() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);

        sim.fail_open(io::ErrorKind::PermissionDenied, "Permission denied");
        let err = conn.connect(Some(SIM_PORT)).await.unwrap_err();
        assert!(err.is(&ErrorCode::PERMISSION_DENIED));

        sim.fail_open(io::ErrorKind::Other, "Device or resource busy");
        let err = conn.connect(Some(SIM_PORT)).await.unwrap_err();
        assert!(err.is(&ErrorCode::PORT_BUSY));
        assert_eq!(err.context().get("port").and_then(|v| v.as_str()), Some(SIM_PORT));
    }

    #[tokio::test]
    async fn test_unknown_path_is_no_device_found() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        let err = conn.connect(Some("/dev/ttyUSB7")).await.unwrap_err();
        assert!(err.is(&ErrorCode::NO_DEVICE_FOUND));
    }

    #[tokio::test]
    async fn test_send_without_connection_is_not_connected() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        let err = conn.send_command("G21", None).await.unwrap_err();
        assert!(err.is(&ErrorCode::NOT_CONNECTED));
        let err = conn.send_command_no_response("!").await.unwrap_err();
        assert!(err.is(&ErrorCode::NOT_CONNECTED));
    }

    #[tokio::test]
    async fn test_round_trip_replies() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        conn.connect(None).await.unwrap();

        assert_eq!(conn.send_command("G21", None).await.unwrap(), "ok");
        let status = conn.send_command("?", None).await.unwrap();
        assert!(status.starts_with("<Idle|MPos:"), "got {}", status);
        assert_eq!(&sim.commands()[1..], &["G21".to_string(), "?".to_string()][..]);
    }

    #[tokio::test]
    async fn test_disconnect_mid_command_invalidates_handle() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        conn.connect(None).await.unwrap();

        sim.disconnect_after(1);
        let err = conn.send_command("G00 X10.000 Y10.000", None).await.unwrap_err();
        assert!(err.is(&ErrorCode::DEVICE_DISCONNECTED));
        assert!(err.context().contains_key("phase"));
        assert!(!conn.is_connected());

        let err = conn.send_command("G21", None).await.unwrap_err();
        assert!(err.is(&ErrorCode::NOT_CONNECTED));

        conn.connect(None).await.unwrap();
        assert_eq!(conn.send_command("G21", None).await.unwrap(), "ok");
        assert_eq!(sim.sessions(), 2);
    }

    #[tokio::test]
    async fn test_reply_timeout_keeps_connection() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        conn.connect(None).await.unwrap();

        sim.set_silent(true);
        let err = conn
            .send_command("G21", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(err.is(&ErrorCode::RESPONSE_TIMEOUT));
        assert_eq!(err.context().get("partial_response").and_then(|v| v.as_str()), Some(""));
        assert!(conn.is_connected());

        sim.set_silent(false);
        assert_eq!(conn.send_command("G90", None).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_bang_reply_is_command_rejected() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        conn.connect(None).await.unwrap();

        sim.script_reply("SP", "!8 Err: Unknown command");
        let err = conn.send_command("SP,1", None).await.unwrap_err();
        assert!(err.is(&ErrorCode::COMMAND_REJECTED));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_realtime_byte_without_reply() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        conn.connect(None).await.unwrap();

        conn.send_command_no_response("!").await.unwrap();
        let status = conn.send_command("?", None).await.unwrap();
        assert!(status.starts_with("<Hold"), "got {}", status);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let sim = SimulatedPlotter::new();
        let conn = create_connection(&sim);
        conn.connect(None).await.unwrap();
        conn.disconnect().await;
        conn.disconnect().await;
        assert!(!conn.is_connected());
        assert_eq!(conn.firmware_version(), None);
    }
}
