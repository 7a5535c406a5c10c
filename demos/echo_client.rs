use std::error::Error;
use tracing::info;

use sbdp::{Message, Socket};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let mut client = Socket::new();
    if !client.create() || !client.connect("127.0.0.1", 7878).await {
        return Err("could not reach the echo server on 127.0.0.1:7878".into());
    }

    let mut msg = Message::new();
    msg.insert("greeting", "hello sbdp");
    msg.insert("attempt", 1u64);
    msg.insert("pi", std::f64::consts::PI);

    info!("sending message");
    client.send_message(&msg).await?;

    let reply = client.recv_message(5_000).await?;
    info!(?reply, "received echo");
    assert_eq!(reply, msg);

    client.close();
    Ok(())
}
