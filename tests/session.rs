//! End-to-end session tests with a local TCP listener playing the simulator.

use altitude_hold::telemetry::{TelemetryChannel, FRAME_SIZE, STATE_SIZE, STATE_TIME, STATE_Z};
use altitude_hold::{AltitudeHold, Config, Error, MotorOutput, State, TelemetryError};
use nalgebra::Vector4;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Encode one wire frame with the given time and up-positive altitude.
fn frame_bytes(t: f64, z_up: f64) -> [u8; FRAME_SIZE] {
    let mut values = [0.; STATE_SIZE];
    values[STATE_TIME] = t;
    values[STATE_Z] = -z_up;
    let mut bytes = [0; FRAME_SIZE];
    for (chunk, value) in bytes.chunks_exact_mut(8).zip(&values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[derive(Clone, Default)]
struct SharedMotors(Arc<Mutex<Vec<Vector4<f64>>>>);

impl SharedMotors {
    fn sent(&self) -> Vec<Vector4<f64>> {
        self.0.lock().unwrap().clone()
    }
}

impl MotorOutput for SharedMotors {
    fn set_motors(&mut self, outputs: Vector4<f64>) {
        self.0.lock().unwrap().push(outputs);
    }
}

fn config(port: u16) -> Config {
    // Repeated init calls from parallel tests are fine; only the first wins.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    Config {
        port,
        frame_timeout: Duration::from_millis(200),
        ..Config::default()
    }
}

#[tokio::test]
async fn connect_to_dead_port_fails_fast() {
    // Bind then drop to find a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut hold = AltitudeHold::new(config(port), SharedMotors::default());
    let err = hold.run().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Telemetry(TelemetryError::Connection { .. })
    ));
    assert_eq!(hold.state(), State::Idle);
}

#[tokio::test]
async fn split_frame_is_reassembled_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let bytes = frame_bytes(1., 5.);

        // One frame split across two writes with a pause in between.
        stream.write_all(&bytes[..40]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        stream.write_all(&bytes[40..]).await.unwrap();

        stream.write_all(&frame_bytes(-1., 0.)).await.unwrap();
    });

    let motors = SharedMotors::default();
    let mut hold = AltitudeHold::new(config(port), motors.clone());
    hold.run().await.unwrap();
    server.await.unwrap();

    // Exactly one command from exactly one decoded frame: error 5 m with the
    // takeoff tuning saturates, clamped to 1.
    assert_eq!(motors.sent(), vec![Vector4::repeat(1.)]);
    assert_eq!(hold.state(), State::Stopped);
}

#[tokio::test]
async fn sentinel_timestamp_stops_and_releases_the_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&frame_bytes(0.5, 1.)).await.unwrap();
        stream.write_all(&frame_bytes(-1., 0.)).await.unwrap();

        // The controller dropping its socket surfaces as EOF here.
        let mut buf = [0; 1];
        let read = stream.read(&mut buf).await.unwrap();
        assert_eq!(read, 0);
    });

    let mut hold = AltitudeHold::new(config(port), SharedMotors::default());
    hold.run().await.unwrap();
    assert_eq!(hold.state(), State::Stopped);
    server.await.unwrap();
}

#[tokio::test]
async fn peer_disconnect_ends_the_session_normally() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&frame_bytes(0.5, 2.)).await.unwrap();
        stream.write_all(&frame_bytes(1., 3.)).await.unwrap();
        // Drop on a frame boundary: a clean close, not an error.
    });

    let motors = SharedMotors::default();
    let mut hold = AltitudeHold::new(config(port), motors.clone());
    hold.run().await.unwrap();
    server.await.unwrap();

    assert_eq!(motors.sent().len(), 2);
    assert_eq!(hold.state(), State::Stopped);
}

#[tokio::test]
async fn partial_tail_frame_is_discarded_not_underdecoded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&frame_bytes(0.5, 2.)).await.unwrap();
        // Ten stray bytes of a next frame, then disconnect mid-frame.
        stream.write_all(&frame_bytes(1., 3.)[..10]).await.unwrap();
    });

    let motors = SharedMotors::default();
    let mut hold = AltitudeHold::new(config(port), motors.clone());
    hold.run().await.unwrap();
    server.await.unwrap();

    // Only the complete frame produced a command.
    assert_eq!(motors.sent().len(), 1);
    assert_eq!(hold.state(), State::Stopped);
}

#[tokio::test]
async fn recv_frame_times_out_then_reassembles_across_calls() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let bytes = frame_bytes(2., 7.);

        // Half a frame, a long pause, then the rest.
        stream.write_all(&bytes[..48]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream.write_all(&bytes[48..]).await.unwrap();

        // Keep the connection up until the client is done reading.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut channel = TelemetryChannel::connect("127.0.0.1", port).await.unwrap();

    // The first call sees only half a frame and reports no data yet.
    let first = channel.recv_frame(Duration::from_millis(40)).await.unwrap();
    assert!(first.is_none());

    // The buffered half carries over into the next call.
    let frame = channel
        .recv_frame(Duration::from_millis(500))
        .await
        .unwrap()
        .expect("frame after reassembly");
    assert_eq!(frame.timestamp(), 2.);
    assert_eq!(frame.altitude(), 7.);

    server.await.unwrap();
}
