/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Full session lifecycle without a socket.
//!
//! Wires an initiator and an acceptor back-to-back over in-process streams
//! and walks them through logon, an application message, a heartbeat
//! exchange, and an orderly logout. Time is driven by a manual clock, so the
//! run is fully deterministic.
//!
//! Run with: `cargo run --example session_handshake`

use irongate::prelude::*;
use irongate::transport::stream::{FrameHeader, InProcessSubscription};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Moves every frame from one session's outbound stream into the other
/// session, returning whatever became deliverable.
fn pump(
    link: &str,
    from: &mut InProcessSubscription,
    to: &mut Session,
    now_ns: u64,
) -> Vec<OwnedMessage> {
    let mut frames: Vec<Vec<u8>> = Vec::new();
    {
        let mut handler = |_header: &FrameHeader, payload: &[u8]| {
            frames.push(payload.to_vec());
        };
        from.poll(&mut handler, 64);
    }

    let mut delivered = Vec::new();
    for frame in frames {
        let message = Decoder::new(&frame).decode().expect("well-formed frame");
        info!(link, msg_type = %message.msg_type(), "transferring");
        if let Action::Deliver(messages) = to.on_message(&message, now_ns) {
            delivered.extend(messages);
        }
    }
    delivered
}

fn main() {
    init_logging();

    let clock = ManualClock::new(0);
    let (initiator_pub, mut initiator_out) = in_process_stream(64);
    let (acceptor_pub, mut acceptor_out) = in_process_stream(64);

    let mut initiator = Session::initiator(
        SessionConfig::new(
            CompId::new("BUYSIDE").unwrap(),
            CompId::new("EXCHANGE").unwrap(),
            "FIX.4.4",
        )
        .with_heartbeat_interval(Duration::from_secs(30)),
        SessionId::new(1),
        ConnectionId::new(1),
        LibraryId::new(1),
        Arc::new(initiator_pub),
        Arc::new(MemoryStore::new()),
        Arc::new(clock.clone()),
    );

    let mut acceptor = Session::acceptor(
        SessionConfig::new(
            CompId::new("EXCHANGE").unwrap(),
            CompId::new("BUYSIDE").unwrap(),
            "FIX.4.4",
        ),
        SessionId::new(1),
        ConnectionId::new(2),
        LibraryId::new(1),
        Arc::new(acceptor_pub),
        Arc::new(MemoryStore::new()),
        Arc::new(clock.clone()),
    );

    // Logon handshake.
    initiator.connect().expect("logon refused");
    pump("initiator->acceptor", &mut initiator_out, &mut acceptor, clock.nanos());
    pump("acceptor->initiator", &mut acceptor_out, &mut initiator, clock.nanos());
    info!(
        initiator = initiator.state().name(),
        acceptor = acceptor.state().name(),
        "handshake complete"
    );

    // One application message, delivered in sequence on the far side.
    initiator
        .send_application(&MsgType::NewOrderSingle, |builder| {
            builder.put_str(11, "ORDER-1");
            builder.put_str(55, "EURUSD");
            builder.put_str(54, "1");
            builder.put_uint(38, 100);
        })
        .expect("order refused");
    let delivered = pump("initiator->acceptor", &mut initiator_out, &mut acceptor, clock.nanos());
    for message in &delivered {
        info!(
            cl_ord_id = message.get_field_str(11).unwrap_or("?"),
            symbol = message.get_field_str(55).unwrap_or("?"),
            "order delivered"
        );
    }

    // A quiet heartbeat interval later, both sides probe.
    clock.advance_millis(30_000);
    initiator.poll(clock.nanos());
    acceptor.poll(clock.nanos());
    pump("initiator->acceptor", &mut initiator_out, &mut acceptor, clock.nanos());
    pump("acceptor->initiator", &mut acceptor_out, &mut initiator, clock.nanos());

    // Orderly logout, initiated by the buy side.
    initiator.start_logout().expect("logout refused");
    pump("initiator->acceptor", &mut initiator_out, &mut acceptor, clock.nanos());
    pump("acceptor->initiator", &mut acceptor_out, &mut initiator, clock.nanos());

    // The acceptor waits out its disconnect timer.
    clock.advance_millis(60_000);
    acceptor.poll(clock.nanos());

    info!(
        initiator = initiator.state().name(),
        initiator_reason = ?initiator.disconnect_reason(),
        acceptor = acceptor.state().name(),
        "lifecycle complete"
    );
}
