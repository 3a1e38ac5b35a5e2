//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置文件到运行引擎的完整装配
//! - 模拟硬件 e2e 测试（Mock 连接器，无需真实设备）
//! - 链路丢失与恢复场景

#[cfg(test)]
mod contract_tests {
    use contracts::{parse_trigger_line, ActuatorCommand, TriggerLevel};

    #[test]
    fn test_wire_formats_agree() {
        assert_eq!(
            parse_trigger_line(b"+OCCH1:1", 1).unwrap(),
            Some(TriggerLevel::High)
        );
        assert_eq!(ActuatorCommand::engage(3).encode(), b"AT+STACH3=1\r\n".to_vec());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        Admission, LinkAddress, LinkState, Package, PulseKind, SinkConfig, SinkType,
        SorterBlueprint, SortReport,
    };
    use link::{MockConnector, MockPeers};
    use sort_engine::{now, SortingEngine};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::sleep;

    const BLUEPRINT: &str = r#"
error_chute = 99

[trigger]
address = { kind = "tcp", host = "10.0.0.2", port = 4001 }

[timing]
default_interval_ms = 500

[[chutes]]
chute = 1
module = { kind = "tcp", host = "10.0.0.10", port = 4001 }
pin = 1
pulse_distance = 3
delay_factor = 0.5
magnet_hold_ms = 200

[[chutes]]
chute = 2
module = { kind = "tcp", host = "10.0.0.10", port = 4001 }
pin = 2
pulse_distance = 1
delay_factor = 0.0
magnet_hold_ms = 100
"#;

    fn trigger() -> LinkAddress {
        LinkAddress::tcp("10.0.0.2", 4001)
    }

    fn module() -> LinkAddress {
        LinkAddress::tcp("10.0.0.10", 4001)
    }

    fn blueprint_with_file_sink(path: &Path) -> SorterBlueprint {
        let mut blueprint = ConfigLoader::load_from_str(BLUEPRINT, ConfigFormat::Toml).unwrap();
        blueprint.sinks.push(SinkConfig {
            name: "reports".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 16,
            params: HashMap::from([("path".to_string(), path.display().to_string())]),
        });
        blueprint
    }

    async fn start(
        blueprint: &SorterBlueprint,
        connector: MockConnector,
    ) -> SortingEngine<MockConnector> {
        SortingEngine::start(blueprint, Arc::new(connector))
            .await
            .unwrap()
    }

    async fn telegram(stream: &mut DuplexStream, line: &[u8]) {
        stream.write_all(line).await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();
    }

    async fn read_command(stream: &mut DuplexStream) -> String {
        let mut buf = [0u8; 13];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    fn read_reports(path: &Path) -> Vec<SortReport> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// End-to-end: trigger telegrams -> interpreter -> queue -> actuator -> file sink
    ///
    /// 第二个脉冲的 HIGH 丢失，由两个 LOW 补偿；包裹仍在第三个脉冲到位。
    #[tokio::test(start_paused = true)]
    async fn test_e2e_sorts_through_lost_high() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("reports.jsonl");
        let (connector, mut peers) = MockConnector::new();
        let engine = start(&blueprint_with_file_sink(&path), connector).await;

        let mut sensor = peers.accept_for(&trigger()).await.unwrap();
        let mut module_peer = peers.accept_for(&module()).await.unwrap();

        assert_eq!(
            engine.enqueue(Package::new("PKG-A", 1, now())),
            Admission::Tracked { seeded_count: 0 }
        );

        sleep(Duration::from_millis(500)).await;
        telegram(&mut sensor.stream, b"+OCCH1:1").await;
        sleep(Duration::from_millis(100)).await;
        telegram(&mut sensor.stream, b"+OCCH1:0").await;
        // HIGH at 1000 ms lost
        sleep(Duration::from_millis(500)).await;
        telegram(&mut sensor.stream, b"+OCCH1:0").await;
        sleep(Duration::from_millis(400)).await;
        telegram(&mut sensor.stream, b"+OCCH1:1").await;

        assert_eq!(read_command(&mut module_peer.stream).await, "AT+STACH1=1\r\n");
        assert_eq!(read_command(&mut module_peer.stream).await, "AT+STACH1=0\r\n");

        let summary = engine.shutdown().await;
        assert_eq!(summary.abandoned, 0);

        let stats = engine.stats();
        assert_eq!(stats.trigger.real_events, 2);
        assert_eq!(stats.trigger.compensated_events, 1);
        assert_eq!(stats.pulses.compensated, 1);
        assert_eq!(stats.actuation.succeeded, 1);
        // samples: 500 -> 850 (compensated midpoint) -> 1500
        assert_eq!(stats.interval, Duration::from_millis(650));
        assert_eq!(stats.sinks.len(), 1);
        assert_eq!(stats.sinks[0].1.report_count, 1);

        let reports = read_reports(&path);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.package, "PKG-A");
        assert_eq!(report.outcome.chute, 1);
        assert_eq!(report.outcome.pin, 1);
        assert_eq!(report.outcome.module, "tcp://10.0.0.10:4001");
        assert_eq!(report.outcome.delay_ms, 325);
        assert_eq!(report.outcome.trigger_kind, PulseKind::Real);
        assert!(report.outcome.released_at >= report.outcome.engaged_at);
    }

    /// 触发链路断开后自动重连，之后的脉冲照常驱动分拣
    #[tokio::test(start_paused = true)]
    async fn test_e2e_trigger_link_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");
        let (connector, mut peers) = MockConnector::new();
        let engine = start(&blueprint_with_file_sink(&path), connector).await;
        let mut events = engine.subscribe_link_events();

        let sensor = peers.accept_for(&trigger()).await.unwrap();
        let mut module_peer = peers.accept_for(&module()).await.unwrap();

        drop(sensor);
        let mut sensor = peers.accept_for(&trigger()).await.unwrap();

        let mut seen = Vec::new();
        while seen.last() != Some(&LinkState::Connected) {
            let event = events.recv().await.unwrap();
            if event.address == trigger() {
                seen.push(event.to);
            }
        }
        assert!(seen.contains(&LinkState::Reconnecting));
        assert!(engine.link_states()[&trigger()].is_connected());

        engine.enqueue(Package::new("PKG-B", 2, now()));
        telegram(&mut sensor.stream, b"+OCCH1:1").await;

        assert_eq!(read_command(&mut module_peer.stream).await, "AT+STACH2=1\r\n");
        assert_eq!(read_command(&mut module_peer.stream).await, "AT+STACH2=0\r\n");

        engine.shutdown().await;
        let reports = read_reports(&path);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].package, "PKG-B");
        assert_eq!(reports[0].outcome.delay_ms, 0);
    }

    /// 执行模块不可达：动作失败、不上报，其他组件不受影响
    #[tokio::test(start_paused = true)]
    async fn test_e2e_unreachable_module_fails_without_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");
        let (connector, mut peers) = MockConnector::new();
        connector.refuse(&module(), 1_000);
        let engine = start(&blueprint_with_file_sink(&path), connector).await;

        let mut sensor = peers.accept_for(&trigger()).await.unwrap();
        assert!(!engine.link_states()[&module()].is_connected());

        engine.enqueue(Package::new("PKG-C", 2, now()));
        engine.enqueue(Package::new("PKG-D", 1, now()));
        telegram(&mut sensor.stream, b"+OCCH1:1").await;
        sleep(Duration::from_millis(50)).await;

        let stats = engine.stats();
        assert_eq!(stats.queue.released, 1);
        assert_eq!(stats.queue.in_flight, 1);

        engine.shutdown().await;
        let stats = engine.stats();
        assert_eq!(stats.actuation.failed_engage, 1);
        assert_eq!(stats.actuation.succeeded, 0);
        assert!(read_reports(&path).is_empty());
    }

    /// 配置文件 -> 引擎：错误槽口不可绑定
    #[tokio::test(start_paused = true)]
    async fn test_e2e_blueprint_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("sorter.toml");
        std::fs::write(&config_path, BLUEPRINT).unwrap();

        let blueprint = ConfigLoader::load_from_path(&config_path).unwrap();
        assert_eq!(blueprint.chutes.len(), 2);

        let (connector, _peers) = MockConnector::new();
        let engine = start(&blueprint, connector).await;
        assert_eq!(
            engine.enqueue(Package::new("PKG-E", 99, now())),
            Admission::Rerouted {
                requested: 99,
                error_chute: 99
            }
        );
        assert_eq!(engine.link_states().len(), 2);
        engine.shutdown().await;
    }
}
