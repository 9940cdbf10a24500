// Scripted connect / send / receive / disconnect run against the simulator

use anyhow::{bail, Context, Result};
use colored::*;
use lefacade_core::{
    AddressWithType, DecodedEvent, ErrorCode, FacadeConfig, LeAclData, LeAclFacade,
    LeConnectionMsg, LeHandleMsg, SimOptions, SimulatedController, StatusCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

const STEP_TIMEOUT: Duration = Duration::from_secs(2);
const PEER: &str = "AA:BB:CC:DD:EE:FF";

pub async fn run(config: FacadeConfig) -> Result<()> {
    println!("{}", "Running self-tests...".bold());
    println!();

    let controller = Arc::new(
        SimulatedController::new(SimOptions::default()).context("Failed to start simulator")?,
    );
    let facade = LeAclFacade::new(controller.clone(), config);
    let data = facade.fetch_acl_data().context("Data stream unavailable")?;
    let data = data.timeout(STEP_TIMEOUT);
    tokio::pin!(data);

    // Connect
    let request = LeConnectionMsg {
        address: PEER.to_string(),
        address_type: 0,
    };
    let stream = facade.create_connection(&request)?;
    let events = stream.timeout(STEP_TIMEOUT);
    tokio::pin!(events);

    if facade.create_connection(&request).map_err(|e| e.status()).err()
        != Some(StatusCode::ResourceExhausted)
    {
        bail!("Second outstanding request was admitted");
    }
    println!("{} Single outstanding request", "✓".green());

    let link = controller
        .complete_pending()
        .context("Connection attempt never reached the controller")?;
    let handle = match events.next().await {
        Some(Ok(event)) => match event.decode()? {
            DecodedEvent::ConnectionComplete(complete) if complete.status.is_success() => {
                complete.connection_handle
            }
            other => bail!("Unexpected connection outcome: {:?}", other),
        },
        _ => bail!("No connection complete event"),
    };
    if handle != 0x10 {
        bail!("First connection got handle 0x{:03x}, expected 0x010", handle);
    }
    println!(
        "{} Connected to {} as handle {}",
        "✓".green(),
        PEER,
        format!("0x{:03x}", handle).bright_cyan()
    );

    // Send
    facade
        .send_acl_data(LeAclData {
            handle,
            payload: b"selftest".to_vec(),
        })
        .await?;
    if link.sent() != vec![b"selftest".to_vec()] {
        bail!("Payload missing from the outbound queue");
    }
    println!("{} Outbound data enqueued", "✓".green());

    // Receive
    link.deliver_inbound(vec![0xDE, 0xAD]);
    match data.next().await {
        Some(Ok(received)) if received.handle == handle && received.payload == [0xDE, 0xAD] => {}
        other => bail!("Unexpected inbound data: {:?}", other),
    }
    println!("{} Inbound data relayed", "✓".green());

    // Disconnect
    facade.disconnect(&LeHandleMsg { handle })?;
    match events.next().await {
        Some(Ok(event)) => match event.decode()? {
            DecodedEvent::Disconnect(disconnect) if disconnect.connection_handle == handle => {}
            other => bail!("Unexpected disconnection event: {:?}", other),
        },
        _ => bail!("No disconnection event"),
    }
    if facade.disconnect(&LeHandleMsg { handle }).is_ok() {
        bail!("Handle still registered after disconnection");
    }
    println!("{} Disconnection relayed", "✓".green());

    // Failure path
    let stream = facade.create_connection(&request)?;
    let failures = stream.timeout(STEP_TIMEOUT);
    tokio::pin!(failures);
    controller.fail_pending(ErrorCode::PAGE_TIMEOUT);
    match failures.next().await {
        Some(Ok(event)) => match event.decode()? {
            DecodedEvent::ConnectionComplete(complete)
                if complete.status == ErrorCode::PAGE_TIMEOUT && complete.connection_handle == 0 => {}
            other => bail!("Unexpected failure event: {:?}", other),
        },
        _ => bail!("No failure event"),
    }
    println!("{} Connection failure reported", "✓".green());

    let peer = AddressWithType::parse(PEER, 0)?;
    if controller.initiated() != vec![peer, peer] {
        bail!("Unexpected controller calls: {:?}", controller.initiated());
    }

    facade.shutdown();
    println!();
    println!("{}", "All tests passed!".green().bold());

    Ok(())
}
