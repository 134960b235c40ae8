//! Echo client: connects, handshakes, sends a few packets, and prints the
//! echoes.
//!
//! ```sh
//! cargo run --example echo_client
//! ```

use gatenet::GateClient;

#[tokio::main]
async fn main() -> gatenet::Result<()> {
    let mut client = GateClient::connect("127.0.0.1:7350", "").await?;
    println!(
        "connected, negotiated heartbeat: {:?}",
        client.heartbeat_interval()
    );

    for i in 0..3u32 {
        let body = format!("message {i}");
        client.send_data(100, body.as_bytes()).await?;
        if let Some(echoed) = client.recv().await? {
            println!(
                "echo: id={} body={:?}",
                echoed.id(),
                String::from_utf8_lossy(echoed.body())
            );
        }
    }

    client.close().await
}
