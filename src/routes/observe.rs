use crate::bus::BusGateway;
use crate::observer::Observer;
use crate::rooms::RoomHub;
use futures::{SinkExt, StreamExt};
use rocket::{State, get};
use rocket_ws as ws;
use std::sync::Arc;
use std::time::Duration;

/// Diagnostic stream: a snapshot of the broadcaster internals every second.
#[get("/logs")]
pub fn logs_socket(
    ws: ws::WebSocket,
    hub: &State<Arc<RoomHub>>,
    gateway: &State<Arc<BusGateway>>,
) -> ws::Channel<'static> {
    let hub = hub.inner().clone();
    let gateway = gateway.inner().clone();

    ws.channel(move |mut stream| {
        Box::pin(async move {
            let mut observer = Observer::new(hub, gateway);
            let mut ticker = tokio::time::interval(Duration::from_secs(1));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = observer.report().await;
                        if stream
                            .send(ws::Message::Text(report.to_string()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(ws::Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(_)) => {} // inbound frames are ignored
                    },
                }
            }
            Ok(())
        })
    })
}
