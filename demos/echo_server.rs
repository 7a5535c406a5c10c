use std::error::Error;
use tracing::{info, warn};

use sbdp::Socket;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let mut listener = Socket::new();
    if !listener.create() || !listener.bind(7878) || !listener.listen() {
        return Err("could not listen on port 7878".into());
    }
    info!("SBDP echo server listening on port 7878");

    loop {
        let mut conn = listener.accept().await?;
        tokio::spawn(async move {
            loop {
                match conn.recv_message(30_000).await {
                    Ok(msg) => {
                        info!(entries = msg.len(), "echoing message");
                        if let Err(e) = conn.send_message(&msg).await {
                            warn!(error = %e, "send failed");
                            break;
                        }
                    }
                    Err(e) => {
                        info!(reason = %e, "session ended");
                        break;
                    }
                }
            }
        });
    }
}
